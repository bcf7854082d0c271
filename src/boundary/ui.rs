//! 浏览器 UI 边界
//!
//! 所有页面读写都通过 [`JsExecutor`] 和语义元素完成，不直接拼选择器

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value as JsonValue};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::boundary::{snapshot_from_json, LoginResponse, QaBoundary, SubmitResponse};
use crate::config::{BoundaryKind, Config, Routes};
use crate::error::{HarnessError, HarnessResult};
use crate::infrastructure::JsExecutor;
use crate::models::access::names_format_rejection;
use crate::models::{
    AccessEvidence, Actor, AuthFailure, AuthFailureReason, CapabilityToken, Credential, JobId,
    LoginProfile, ProtectedResource, QuestionPayload, Role, StatusSnapshot, UploadOutcome,
};
use crate::selectors::Element;

const TOKEN_STORAGE_KEY: &str = "token";
const SESSION_COOKIES: [&str; 3] = ["token", "session", "sid"];

/// 页面上的置信度可能显示为百分比
fn normalize_confidence(text: &str) -> JsonValue {
    let trimmed = text.trim();
    match trimmed.strip_suffix('%') {
        Some(pct) => match pct.trim().parse::<f64>() {
            Ok(v) => json!(v / 100.0),
            Err(_) => json!(trimmed),
        },
        None => json!(trimmed),
    }
}

/// 新出现的非空文本（与操作前的旧值不同）
fn fresh(current: Option<String>, previous: Option<&str>) -> Option<String> {
    current.filter(|text| !text.is_empty() && Some(text.as_str()) != previous)
}

/// 上传后页面出现的错误消息
///
/// 只有点名文件格式（CSV/format）的消息才算 415；其他拒绝原因不能冒充格式错误
fn upload_error(message: String) -> HarnessResult<UploadOutcome> {
    if names_format_rejection(&message) {
        Ok(UploadOutcome::UnsupportedMediaType { message })
    } else {
        Err(HarnessError::protocol(
            "upload",
            format!("上传被拒绝，但消息不是格式错误: {}", message),
        ))
    }
}

/// UI 边界
pub struct UiBoundary {
    executor: JsExecutor,
    base_url: String,
    routes: Routes,
    settle_timeout: Duration,
    settle_interval: Duration,
}

impl UiBoundary {
    pub fn new(executor: JsExecutor, config: &Config) -> Self {
        Self {
            executor,
            base_url: config.ui_base_url.trim_end_matches('/').to_string(),
            routes: config.routes.clone(),
            settle_timeout: config.request_timeout(),
            settle_interval: Duration::from_millis(100),
        }
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }

    /// 反复探测页面直到得到结果，超过 `settle_timeout` 视为边界没有给出预期信号
    async fn wait_for<T, F, Fut>(&self, what: &str, mut poll: F) -> HarnessResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = HarnessResult<Option<T>>> + Send,
        T: Send,
    {
        let deadline = Instant::now() + self.settle_timeout;
        loop {
            if let Some(value) = poll().await? {
                return Ok(value);
            }
            if Instant::now() >= deadline {
                return Err(HarnessError::protocol(
                    what,
                    format!("{}ms 内页面没有给出结果", self.settle_timeout.as_millis()),
                ));
            }
            sleep(self.settle_interval).await;
        }
    }

    /// 等待前端路由稳定（连续两次读到同一路径）
    async fn stable_path(&self) -> HarnessResult<String> {
        let deadline = Instant::now() + self.settle_timeout;
        let mut last = self.executor.current_path().await?;
        loop {
            sleep(self.settle_interval).await;
            let current = self.executor.current_path().await?;
            if current == last || Instant::now() >= deadline {
                return Ok(current);
            }
            last = current;
        }
    }

    async fn session_token(&self) -> HarnessResult<Option<CapabilityToken>> {
        if let Some(token) = self.executor.local_storage(TOKEN_STORAGE_KEY).await? {
            if !token.is_empty() {
                return Ok(Some(CapabilityToken::Bearer(token)));
            }
        }
        Ok(self
            .executor
            .cookie(&SESSION_COOKIES)
            .await?
            .map(CapabilityToken::Cookie))
    }

    /// 让页面的登录状态与 actor 的令牌一致，返回是否做了修改
    async fn sync_identity(&self, actor: &Actor) -> HarnessResult<bool> {
        match actor.token() {
            None => {
                let had_token = self.session_token().await?.is_some();
                self.executor.clear_storage().await?;
                Ok(had_token)
            }
            Some(CapabilityToken::Bearer(token)) => {
                let stored = self.executor.local_storage(TOKEN_STORAGE_KEY).await?;
                if stored.as_deref() == Some(token.as_str()) {
                    return Ok(false);
                }
                self.executor.set_local_storage(TOKEN_STORAGE_KEY, token).await?;
                Ok(true)
            }
            Some(CapabilityToken::Cookie(_)) => Ok(false),
        }
    }

    /// 以 actor 身份打开路由，返回稳定后的路径
    async fn open_route(&self, actor: &Actor, route: &str) -> HarnessResult<String> {
        let url = self.url(route);
        self.executor.goto(&url).await?;
        if self.sync_identity(actor).await? {
            debug!("登录状态已同步，重新打开 {}", route);
            self.executor.goto(&url).await?;
        }
        self.stable_path().await
    }

    fn redirected_to_login(&self, actor: &Actor, path: &str) -> Option<HarnessError> {
        if path != self.routes.login {
            return None;
        }
        let reason = if actor.is_authenticated() {
            AuthFailureReason::Unauthorized
        } else {
            AuthFailureReason::MissingToken
        };
        Some(HarnessError::Auth(AuthFailure {
            reason,
            status: None,
            message: format!("被重定向到登录页 {}", path),
        }))
    }

    async fn login_settled(&self, previous_error: Option<&str>) -> HarnessResult<Option<LoginResponse>> {
        let path = self.executor.current_path().await?;
        if path != self.routes.login {
            let Some(token) = self.session_token().await? else {
                return Ok(None);
            };
            let role = self
                .executor
                .read_text(Element::UserRole)
                .await?
                .and_then(|r| Role::from_str(&r));
            return Ok(Some(LoginResponse::Granted {
                token,
                role,
                profile: LoginProfile::default(),
            }));
        }

        let error = fresh(self.executor.read_text(Element::ErrorMessage).await?, previous_error);
        Ok(error.map(|message| LoginResponse::Rejected {
            status: None,
            message,
        }))
    }

    async fn submit_settled(
        &self,
        previous_job: Option<&str>,
        previous_error: Option<&str>,
    ) -> HarnessResult<Option<SubmitResponse>> {
        if let Some(message) =
            fresh(self.executor.read_text(Element::ErrorMessage).await?, previous_error)
        {
            return Ok(Some(SubmitResponse::Rejected {
                status: None,
                field: None,
                message,
            }));
        }

        let Some(job_id) = fresh(self.executor.read_text(Element::JobId).await?, previous_job)
        else {
            return Ok(None);
        };
        let Some(status) = self.executor.read_text(Element::JobStatus).await? else {
            return Ok(None);
        };
        let submitted_at = self
            .executor
            .read_text(Element::SubmittedAt)
            .await?
            .filter(|s| !s.is_empty());

        Ok(Some(SubmitResponse::Accepted {
            job_id,
            status,
            submitted_at,
        }))
    }

    /// 把页面上的任务区域读成与 API 相同结构的 JSON
    async fn read_job_panel(&self, job_id: &JobId) -> HarnessResult<JsonValue> {
        let shown = self.executor.read_text(Element::JobId).await?;
        match shown.as_deref() {
            Some(id) if id == job_id.as_str() => {}
            other => {
                return Err(HarnessError::protocol(
                    "job-id",
                    format!("页面显示的任务 {:?} 不是 {}", other, job_id),
                ))
            }
        }

        let mut body = Map::new();
        body.insert("jobId".to_string(), json!(job_id.as_str()));
        if let Some(status) = self.executor.read_text(Element::JobStatus).await? {
            body.insert("status".to_string(), json!(status));
        }
        if let Some(answer) = self.executor.read_text(Element::Answer).await? {
            if !answer.is_empty() {
                body.insert("answer".to_string(), json!(answer));
            }
        }
        if let Some(confidence) = self.executor.read_text(Element::Confidence).await? {
            if !confidence.is_empty() {
                body.insert("confidence".to_string(), normalize_confidence(&confidence));
            }
        }
        if let Some(error) = self.executor.read_text(Element::ErrorMessage).await? {
            if !error.is_empty() {
                body.insert("error".to_string(), json!(error));
            }
        }
        Ok(JsonValue::Object(body))
    }
}

#[async_trait]
impl QaBoundary for UiBoundary {
    fn kind(&self) -> BoundaryKind {
        BoundaryKind::Ui
    }

    async fn login(&self, credential: &Credential) -> HarnessResult<LoginResponse> {
        self.executor.goto(&self.url(&self.routes.login)).await?;
        self.executor.clear_storage().await?;

        let previous_error = self.executor.read_text(Element::ErrorMessage).await?;
        self.executor.fill(Element::EmailInput, &credential.email).await?;
        self.executor.fill(Element::PasswordInput, &credential.password).await?;
        self.executor.click(Element::LoginButton).await?;

        self.wait_for("登录结果", || self.login_settled(previous_error.as_deref()))
            .await
    }

    async fn logout(&self, _token: &CapabilityToken) -> HarnessResult<()> {
        if self.executor.is_present(Element::LogoutButton).await? {
            self.executor.click(Element::LogoutButton).await?;
        } else {
            debug!("页面上没有登出按钮，直接清理本地会话");
        }
        self.executor.clear_storage().await
    }

    async fn submit(&self, actor: &Actor, payload: &QuestionPayload) -> HarnessResult<SubmitResponse> {
        let path = self.open_route(actor, &self.routes.dashboard).await?;
        if let Some(err) = self.redirected_to_login(actor, &path) {
            return Err(err);
        }

        let previous_job = self.executor.read_text(Element::JobId).await?;
        let previous_error = self.executor.read_text(Element::ErrorMessage).await?;

        self.executor.fill(Element::QuestionInput, &payload.question).await?;
        self.executor
            .fill(Element::CompanyInput, payload.company.as_deref().unwrap_or(""))
            .await?;
        self.executor.click(Element::SubmitButton).await?;

        self.wait_for("提交结果", || {
            self.submit_settled(previous_job.as_deref(), previous_error.as_deref())
        })
        .await
    }

    async fn poll_status(&self, _actor: &Actor, job_id: &JobId) -> HarnessResult<StatusSnapshot> {
        let body = self.read_job_panel(job_id).await?;
        snapshot_from_json(&body)
    }

    async fn fetch_result(&self, _actor: &Actor, job_id: &JobId) -> HarnessResult<StatusSnapshot> {
        let body = self.read_job_panel(job_id).await?;
        snapshot_from_json(&body)
    }

    async fn request_resource(
        &self,
        actor: &Actor,
        resource: &ProtectedResource,
    ) -> HarnessResult<AccessEvidence> {
        let mut path = self.open_route(actor, &resource.ui_route).await?;
        let deadline = Instant::now() + self.settle_timeout;
        let mut marker_present = self.executor.is_present(resource.marker).await?;

        // 停留在目标路由但标记元素还没渲染时继续等，直到超时
        while path == resource.ui_route && !marker_present && Instant::now() < deadline {
            sleep(self.settle_interval).await;
            path = self.executor.current_path().await?;
            marker_present = self.executor.is_present(resource.marker).await?;
        }

        Ok(AccessEvidence::Page {
            requested_route: resource.ui_route.clone(),
            final_path: path,
            marker_present,
        })
    }

    async fn upload_companies(
        &self,
        actor: &Actor,
        file_name: &str,
        mime: &str,
        content: &str,
    ) -> HarnessResult<UploadOutcome> {
        let path = self.open_route(actor, &self.routes.upload).await?;
        if path == self.routes.denial {
            return Ok(UploadOutcome::Forbidden {
                status: 403,
                message: format!("被重定向到拒绝页 {}", path),
            });
        }
        if path == self.routes.login {
            return Ok(UploadOutcome::Forbidden {
                status: 401,
                message: format!("被重定向到登录页 {}", path),
            });
        }

        let previous_error = self.executor.read_text(Element::ErrorMessage).await?;
        self.executor
            .attach_file(Element::UploadInput, file_name, mime, content)
            .await?;
        self.executor.click(Element::UploadButton).await?;

        self.wait_for("上传结果", || async {
            if let Some(message) =
                fresh(self.executor.read_text(Element::ErrorMessage).await?, previous_error.as_deref())
            {
                return upload_error(message).map(Some);
            }
            let Some(rows) = self.executor.read_text(Element::ProcessedRows).await? else {
                return Ok(None);
            };
            let processed_rows = rows.trim().parse::<u64>().map_err(|_| {
                HarnessError::protocol("processed-rows", format!("不是行数: {:?}", rows))
            })?;
            let errors = self
                .executor
                .read_text(Element::UploadErrors)
                .await?
                .map(|text| {
                    text.lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            if processed_rows == 0 {
                warn!("上传完成但没有处理任何行");
            }
            Ok(Some(UploadOutcome::Accepted {
                processed_rows,
                errors,
            }))
        })
        .await
    }
}
