//! 边界层
//!
//! 被测系统有两个可观测表面：浏览器 UI 和 HTTP API。
//! 两者实现同一个能力契约 [`QaBoundary`]，场景开始时通过 [`BoundaryFactory`] 选定其中一种，
//! 上层服务只依赖契约，不关心传输细节。

pub mod api;
#[cfg(test)]
pub(crate) mod scripted;
pub mod ui;

pub use api::ApiBoundary;
pub use ui::UiBoundary;

use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::Browser;
use serde_json::Value as JsonValue;
use tracing::info;

use crate::browser;
use crate::config::{BoundaryKind, Config};
use crate::error::{HarnessError, HarnessResult};
use crate::infrastructure::JsExecutor;
use crate::models::job::parse_iso_timestamp;
use crate::models::{
    AccessEvidence, Actor, CapabilityToken, Credential, JobId, JobResult, JobState, LoginProfile,
    ProtectedResource, QuestionPayload, Role, StatusSnapshot, UploadOutcome,
};
use crate::selectors::{read_json, read_json_f64, read_json_text, Element};

/// 登录请求的原始结果
#[derive(Debug, Clone)]
pub enum LoginResponse {
    Granted {
        token: CapabilityToken,
        role: Option<Role>,
        profile: LoginProfile,
    },
    Rejected {
        status: Option<u16>,
        message: String,
    },
}

/// 提交请求的原始结果，尚未做格式校验
#[derive(Debug, Clone)]
pub enum SubmitResponse {
    Accepted {
        job_id: String,
        status: String,
        submitted_at: Option<String>,
    },
    Rejected {
        status: Option<u16>,
        field: Option<String>,
        message: String,
    },
}

/// 边界能力契约
///
/// 每个方法都是一次边界调用，也是一个挂起点
#[async_trait]
pub trait QaBoundary: Send + Sync {
    fn kind(&self) -> BoundaryKind;

    async fn login(&self, credential: &Credential) -> HarnessResult<LoginResponse>;

    /// 释放令牌；令牌已失效时也返回成功
    async fn logout(&self, token: &CapabilityToken) -> HarnessResult<()>;

    async fn submit(&self, actor: &Actor, payload: &QuestionPayload) -> HarnessResult<SubmitResponse>;

    async fn poll_status(&self, actor: &Actor, job_id: &JobId) -> HarnessResult<StatusSnapshot>;

    /// 读取完成任务的结果；返回的快照同样是一次观测
    async fn fetch_result(&self, actor: &Actor, job_id: &JobId) -> HarnessResult<StatusSnapshot>;

    async fn request_resource(
        &self,
        actor: &Actor,
        resource: &ProtectedResource,
    ) -> HarnessResult<AccessEvidence>;

    async fn upload_companies(
        &self,
        actor: &Actor,
        file_name: &str,
        mime: &str,
        content: &str,
    ) -> HarnessResult<UploadOutcome>;

    /// 按原始字符串查询任务，不做格式校验
    ///
    /// 用于验证边界对非法 ID 和不存在 ID 的处理；默认不支持
    async fn lookup_raw(&self, _actor: &Actor, _raw_id: &str) -> HarnessResult<StatusSnapshot> {
        Err(HarnessError::Config(format!(
            "{:?} 边界不支持按原始 ID 查询任务",
            self.kind()
        )))
    }

    /// 当前用户最近的回答；默认不支持
    async fn recent_answers(&self, _actor: &Actor) -> HarnessResult<Vec<JobResult>> {
        Err(HarnessError::Config(format!(
            "{:?} 边界不支持读取最近回答",
            self.kind()
        )))
    }

    /// 把原始文本当作 JSON 请求体提交，不经过序列化
    ///
    /// 用于验证边界对格式错误请求体的处理；默认不支持
    async fn submit_raw(&self, _actor: &Actor, _body: &str) -> HarnessResult<SubmitResponse> {
        Err(HarnessError::Config(format!(
            "{:?} 边界不支持提交原始请求体",
            self.kind()
        )))
    }
}

/// 把状态响应体解析为快照
///
/// UI 边界把页面元素读成同样结构的 JSON，两种边界共用这一个解析入口
pub fn snapshot_from_json(body: &JsonValue) -> HarnessResult<StatusSnapshot> {
    let status = read_json_text(body, Element::JobStatus)
        .ok_or_else(|| HarnessError::protocol("status", format!("响应中缺少 status: {}", body)))?;
    let state = JobState::parse(&status)?;

    let result = match read_json_text(body, Element::Answer) {
        Some(answer) => {
            let confidence = match read_json(body, Element::Confidence) {
                None => f64::NAN,
                Some(_) => read_json_f64(body, Element::Confidence).ok_or_else(|| {
                    HarnessError::protocol("confidence", format!("confidence 不是数字: {}", body))
                })?,
            };
            let timestamp = match body.pointer("/result/timestamp").and_then(|v| v.as_str()) {
                Some(raw) => Some(parse_iso_timestamp(raw)?),
                None => None,
            };
            Some(JobResult {
                answer,
                confidence,
                question: body
                    .pointer("/result/question")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                company: body
                    .pointer("/result/company")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                timestamp,
            })
        }
        None => None,
    };

    Ok(StatusSnapshot {
        state,
        result,
        message: read_json_text(body, Element::ErrorMessage),
    })
}

/// 解析最近回答列表
///
/// 列表中每一项都按完成结果解析，缺少 answer 或 confidence 即为协议错误
pub fn recent_answers_from_json(body: &JsonValue) -> HarnessResult<Vec<JobResult>> {
    let items = read_json(body, Element::RecentAnswers)
        .and_then(|v| v.as_array())
        .ok_or_else(|| HarnessError::protocol("answers", format!("响应中缺少 answers 列表: {}", body)))?;

    items
        .iter()
        .map(|item| {
            let text = |key: &str| item.get(key).and_then(|v| v.as_str()).map(str::to_string);
            let answer = text("answer").ok_or_else(|| {
                HarnessError::protocol("answer", format!("最近回答缺少 answer: {}", item))
            })?;
            let confidence = item.get("confidence").and_then(|v| v.as_f64()).ok_or_else(|| {
                HarnessError::protocol("confidence", format!("最近回答的 confidence 不是数字: {}", item))
            })?;
            let timestamp = match text("timestamp") {
                Some(raw) => Some(parse_iso_timestamp(&raw)?),
                None => None,
            };
            Ok(JobResult {
                answer,
                confidence,
                question: text("question"),
                company: text("company"),
                timestamp,
            })
        })
        .collect()
}

/// 按选定类型分发到具体边界
pub enum Boundary {
    Api(ApiBoundary),
    Ui(UiBoundary),
}

#[async_trait]
impl QaBoundary for Boundary {
    fn kind(&self) -> BoundaryKind {
        match self {
            Self::Api(b) => b.kind(),
            Self::Ui(b) => b.kind(),
        }
    }

    async fn login(&self, credential: &Credential) -> HarnessResult<LoginResponse> {
        match self {
            Self::Api(b) => b.login(credential).await,
            Self::Ui(b) => b.login(credential).await,
        }
    }

    async fn logout(&self, token: &CapabilityToken) -> HarnessResult<()> {
        match self {
            Self::Api(b) => b.logout(token).await,
            Self::Ui(b) => b.logout(token).await,
        }
    }

    async fn submit(&self, actor: &Actor, payload: &QuestionPayload) -> HarnessResult<SubmitResponse> {
        match self {
            Self::Api(b) => b.submit(actor, payload).await,
            Self::Ui(b) => b.submit(actor, payload).await,
        }
    }

    async fn poll_status(&self, actor: &Actor, job_id: &JobId) -> HarnessResult<StatusSnapshot> {
        match self {
            Self::Api(b) => b.poll_status(actor, job_id).await,
            Self::Ui(b) => b.poll_status(actor, job_id).await,
        }
    }

    async fn fetch_result(&self, actor: &Actor, job_id: &JobId) -> HarnessResult<StatusSnapshot> {
        match self {
            Self::Api(b) => b.fetch_result(actor, job_id).await,
            Self::Ui(b) => b.fetch_result(actor, job_id).await,
        }
    }

    async fn request_resource(
        &self,
        actor: &Actor,
        resource: &ProtectedResource,
    ) -> HarnessResult<AccessEvidence> {
        match self {
            Self::Api(b) => b.request_resource(actor, resource).await,
            Self::Ui(b) => b.request_resource(actor, resource).await,
        }
    }

    async fn upload_companies(
        &self,
        actor: &Actor,
        file_name: &str,
        mime: &str,
        content: &str,
    ) -> HarnessResult<UploadOutcome> {
        match self {
            Self::Api(b) => b.upload_companies(actor, file_name, mime, content).await,
            Self::Ui(b) => b.upload_companies(actor, file_name, mime, content).await,
        }
    }

    async fn lookup_raw(&self, actor: &Actor, raw_id: &str) -> HarnessResult<StatusSnapshot> {
        match self {
            Self::Api(b) => b.lookup_raw(actor, raw_id).await,
            Self::Ui(b) => b.lookup_raw(actor, raw_id).await,
        }
    }

    async fn recent_answers(&self, actor: &Actor) -> HarnessResult<Vec<JobResult>> {
        match self {
            Self::Api(b) => b.recent_answers(actor).await,
            Self::Ui(b) => b.recent_answers(actor).await,
        }
    }

    async fn submit_raw(&self, actor: &Actor, body: &str) -> HarnessResult<SubmitResponse> {
        match self {
            Self::Api(b) => b.submit_raw(actor, body).await,
            Self::Ui(b) => b.submit_raw(actor, body).await,
        }
    }
}

/// 为每个场景创建独立的边界实例
///
/// API 模式共享连接池，令牌仍归场景自己；UI 模式每个场景一个新页面
pub struct BoundaryFactory {
    config: Config,
    http: reqwest::Client,
    browser: Option<Arc<Browser>>,
}

impl BoundaryFactory {
    pub async fn initialize(config: &Config) -> HarnessResult<Self> {
        let http = ApiBoundary::build_client(config)?;
        let browser = match config.boundary {
            BoundaryKind::Ui => Some(Arc::new(browser::open_browser(config).await?)),
            BoundaryKind::Api => None,
        };
        info!("边界类型: {:?}", config.boundary);

        Ok(Self {
            config: config.clone(),
            http,
            browser,
        })
    }

    pub fn kind(&self) -> BoundaryKind {
        self.config.boundary
    }

    pub async fn create(&self) -> HarnessResult<Boundary> {
        match (&self.browser, self.config.boundary) {
            (Some(browser), BoundaryKind::Ui) => {
                let page = browser::new_scenario_page(browser).await?;
                Ok(Boundary::Ui(UiBoundary::new(JsExecutor::new(page), &self.config)))
            }
            _ => Ok(Boundary::Api(ApiBoundary::new(self.http.clone(), &self.config))),
        }
    }
}
