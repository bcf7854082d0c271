//! 错误类型
//!
//! 预期结果（校验拒绝、访问判定）不走这里；这里只放会让场景失败或需要调用方分支的错误

use std::time::Duration;

use thiserror::Error;

use crate::models::job::{format_history, JobId, JobState, Observation};
use crate::models::{AccessDecision, AuthFailure};

#[derive(Debug, Error)]
pub enum HarnessError {
    /// 凭据或令牌被边界拒绝
    #[error("认证失败: {0}")]
    Auth(AuthFailure),

    /// 在预算内没有观测到终态
    #[error(
        "观测超时: 任务 {job_id} 在 {}ms 内未进入终态, 最后状态 {last_state}, 历史 [{}]",
        .budget.as_millis(),
        format_history(.history)
    )]
    ObservationTimeout {
        job_id: JobId,
        last_state: JobState,
        budget: Duration,
        history: Vec<Observation>,
    },

    /// 状态倒退，说明被测系统有缺陷，永不重试
    #[error(
        "状态非单调: 任务 {job_id} 从 {previous} 变为 {observed}, 历史 [{}]",
        format_history(.history)
    )]
    NonMonotonicState {
        job_id: JobId,
        previous: JobState,
        observed: JobState,
        history: Vec<Observation>,
    },

    /// 访问判定无法归类
    #[error("访问判定不明确: {0}")]
    AmbiguousAccess(AccessDecision),

    /// 网络层错误，区别于应用层超时
    #[error("传输错误 ({endpoint}, 已尝试 {attempts} 次): {message}")]
    Transport {
        endpoint: String,
        attempts: u32,
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// 边界返回的数据不符合约定格式
    #[error("协议错误 ({field}): {message}")]
    Protocol { field: String, message: String },

    /// Done 状态的结果违反不变量
    #[error("任务 {job_id} 的结果不合法: {reason}")]
    InvalidResult { job_id: JobId, reason: String },

    #[error("任务不存在: {job_id}")]
    JobNotFound { job_id: String },

    /// 整个场景超出时间预算
    #[error("场景 {scenario} 超时 ({}ms)", .budget.as_millis())]
    ScenarioTimeout { scenario: String, budget: Duration },

    #[error("浏览器错误: {0}")]
    Browser(#[from] chromiumoxide::error::CdpError),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("断言失败: {0}")]
    Assertion(String),

    #[error("JSON 解析失败: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    pub fn protocol(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn transport(endpoint: impl Into<String>, attempts: u32, source: reqwest::Error) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            attempts,
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// 只有连接失败可以有限次重试；请求超时等其他传输错误直接放弃
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { source: Some(e), .. } if e.is_connect())
    }

    /// 致命错误：场景立即失败，绝不重试
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ObservationTimeout { .. }
                | Self::NonMonotonicState { .. }
                | Self::ScenarioTimeout { .. }
                | Self::InvalidResult { .. }
        )
    }

    pub fn auth_failure(&self) -> Option<&AuthFailure> {
        match self {
            Self::Auth(f) => Some(f),
            _ => None,
        }
    }

    /// 错误发生时最后已知的任务状态
    pub fn last_known_state(&self) -> Option<JobState> {
        match self {
            Self::ObservationTimeout { last_state, .. } => Some(*last_state),
            Self::NonMonotonicState { observed, .. } => Some(*observed),
            _ => None,
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
