//! 提交相关模型

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::job::JobHandle;

/// 提交的问题
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionPayload {
    pub question: String,
    /// `None` 表示请求体中不带该字段
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

impl QuestionPayload {
    pub fn new(question: impl Into<String>, company: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            company: Some(company.into()),
        }
    }

    pub fn without_company(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            company: None,
        }
    }

    pub fn question_chars(&self) -> usize {
        self.question.chars().count()
    }
}

/// 提交被拒绝（未创建任务）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub field: String,
    pub rejected: bool,
    /// 边界返回的原始消息
    pub message: String,
    pub status: Option<u16>,
}

impl fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "字段 {} 被拒绝 (HTTP {}): {}", self.field, status, self.message),
            None => write!(f, "字段 {} 被拒绝: {}", self.field, self.message),
        }
    }
}

/// 提交结果，两种都属于正常返回，由调用方分支处理
#[derive(Debug, Clone)]
pub enum Submission {
    Accepted(JobHandle),
    Rejected(ValidationOutcome),
}

impl Submission {
    pub fn handle(&self) -> Option<&JobHandle> {
        match self {
            Self::Accepted(h) => Some(h),
            Self::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&ValidationOutcome> {
        match self {
            Self::Accepted(_) => None,
            Self::Rejected(v) => Some(v),
        }
    }
}
