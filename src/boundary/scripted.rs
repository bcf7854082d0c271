//! 脚本化边界（仅测试）
//!
//! 按预设顺序返回响应；轮询序列耗尽后重复最后一个快照

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::boundary::{LoginResponse, QaBoundary, SubmitResponse};
use crate::config::BoundaryKind;
use crate::error::{HarnessError, HarnessResult};
use crate::models::{
    AccessEvidence, Actor, CapabilityToken, Credential, JobId, JobResult, JobState,
    ProtectedResource, QuestionPayload, StatusSnapshot, UploadOutcome,
};

fn not_scripted(what: &str) -> HarnessError {
    HarnessError::Assertion(format!("脚本中没有配置 {}", what))
}

pub(crate) struct ScriptedBoundary {
    kind: BoundaryKind,
    polls: Mutex<VecDeque<HarnessResult<StatusSnapshot>>>,
    last_poll: Mutex<Option<StatusSnapshot>>,
    result: Mutex<Option<StatusSnapshot>>,
    logins: Mutex<VecDeque<LoginResponse>>,
    submit: Mutex<Option<SubmitResponse>>,
    access: Mutex<Option<AccessEvidence>>,
    upload: Mutex<Option<UploadOutcome>>,
    lookups: Mutex<VecDeque<HarnessResult<StatusSnapshot>>>,
    recent: Mutex<Option<Vec<JobResult>>>,
    poll_count: AtomicU32,
    logout_count: AtomicU32,
}

impl ScriptedBoundary {
    pub(crate) fn new() -> Self {
        Self {
            kind: BoundaryKind::Api,
            polls: Mutex::new(VecDeque::new()),
            last_poll: Mutex::new(None),
            result: Mutex::new(None),
            logins: Mutex::new(VecDeque::new()),
            submit: Mutex::new(None),
            access: Mutex::new(None),
            upload: Mutex::new(None),
            lookups: Mutex::new(VecDeque::new()),
            recent: Mutex::new(None),
            poll_count: AtomicU32::new(0),
            logout_count: AtomicU32::new(0),
        }
    }

    pub(crate) fn with_kind(mut self, kind: BoundaryKind) -> Self {
        self.kind = kind;
        self
    }

    pub(crate) fn with_states(self, states: &[JobState]) -> Self {
        for state in states {
            self.push_poll(Ok(StatusSnapshot::bare(*state)));
        }
        self
    }

    pub(crate) fn with_snapshot(self, snapshot: StatusSnapshot) -> Self {
        self.push_poll(Ok(snapshot));
        self
    }

    pub(crate) fn with_poll_error(self, error: HarnessError) -> Self {
        self.push_poll(Err(error));
        self
    }

    /// `fetch_result` 的返回；不设置时返回最后一次轮询的快照
    pub(crate) fn with_result(self, snapshot: StatusSnapshot) -> Self {
        *self.result.lock().unwrap() = Some(snapshot);
        self
    }

    /// 登录按顺序返回；只剩一个时一直返回它
    pub(crate) fn with_login(self, response: LoginResponse) -> Self {
        self.logins.lock().unwrap().push_back(response);
        self
    }

    pub(crate) fn with_submit(self, response: SubmitResponse) -> Self {
        *self.submit.lock().unwrap() = Some(response);
        self
    }

    pub(crate) fn with_access(self, evidence: AccessEvidence) -> Self {
        *self.access.lock().unwrap() = Some(evidence);
        self
    }

    pub(crate) fn with_upload(self, outcome: UploadOutcome) -> Self {
        *self.upload.lock().unwrap() = Some(outcome);
        self
    }

    /// `lookup_raw` 按顺序返回的结果
    pub(crate) fn with_lookup(self, item: HarnessResult<StatusSnapshot>) -> Self {
        self.lookups.lock().unwrap().push_back(item);
        self
    }

    pub(crate) fn with_recent(self, answers: Vec<JobResult>) -> Self {
        *self.recent.lock().unwrap() = Some(answers);
        self
    }

    pub(crate) fn poll_count(&self) -> u32 {
        self.poll_count.load(Ordering::SeqCst)
    }

    pub(crate) fn logout_count(&self) -> u32 {
        self.logout_count.load(Ordering::SeqCst)
    }

    fn push_poll(&self, item: HarnessResult<StatusSnapshot>) {
        self.polls.lock().unwrap().push_back(item);
    }

    fn next_poll(&self) -> HarnessResult<StatusSnapshot> {
        self.poll_count.fetch_add(1, Ordering::SeqCst);
        let next = self.polls.lock().unwrap().pop_front();
        match next {
            Some(Ok(snapshot)) => {
                *self.last_poll.lock().unwrap() = Some(snapshot.clone());
                Ok(snapshot)
            }
            Some(Err(e)) => Err(e),
            None => self
                .last_poll
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| not_scripted("轮询状态")),
        }
    }
}

#[async_trait]
impl QaBoundary for ScriptedBoundary {
    fn kind(&self) -> BoundaryKind {
        self.kind
    }

    async fn login(&self, _credential: &Credential) -> HarnessResult<LoginResponse> {
        let mut logins = self.logins.lock().unwrap();
        if logins.len() > 1 {
            return Ok(logins.pop_front().unwrap());
        }
        logins.front().cloned().ok_or_else(|| not_scripted("登录"))
    }

    async fn logout(&self, _token: &CapabilityToken) -> HarnessResult<()> {
        self.logout_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn submit(&self, _actor: &Actor, _payload: &QuestionPayload) -> HarnessResult<SubmitResponse> {
        self.submit.lock().unwrap().clone().ok_or_else(|| not_scripted("提交"))
    }

    async fn poll_status(&self, _actor: &Actor, _job_id: &JobId) -> HarnessResult<StatusSnapshot> {
        self.next_poll()
    }

    async fn fetch_result(&self, _actor: &Actor, _job_id: &JobId) -> HarnessResult<StatusSnapshot> {
        let scripted = self.result.lock().unwrap().clone();
        match scripted {
            Some(snapshot) => Ok(snapshot),
            None => self
                .last_poll
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| not_scripted("任务结果")),
        }
    }

    async fn request_resource(
        &self,
        _actor: &Actor,
        _resource: &ProtectedResource,
    ) -> HarnessResult<AccessEvidence> {
        self.access.lock().unwrap().clone().ok_or_else(|| not_scripted("资源访问"))
    }

    async fn upload_companies(
        &self,
        _actor: &Actor,
        _file_name: &str,
        _mime: &str,
        _content: &str,
    ) -> HarnessResult<UploadOutcome> {
        self.upload.lock().unwrap().clone().ok_or_else(|| not_scripted("上传"))
    }

    async fn lookup_raw(&self, _actor: &Actor, _raw_id: &str) -> HarnessResult<StatusSnapshot> {
        let next = self.lookups.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(not_scripted("原始 ID 查询")))
    }

    async fn recent_answers(&self, _actor: &Actor) -> HarnessResult<Vec<JobResult>> {
        self.recent.lock().unwrap().clone().ok_or_else(|| not_scripted("最近回答"))
    }

    /// 原始请求体提交与普通提交共用同一个脚本响应
    async fn submit_raw(&self, _actor: &Actor, _body: &str) -> HarnessResult<SubmitResponse> {
        self.submit.lock().unwrap().clone().ok_or_else(|| not_scripted("提交"))
    }
}
