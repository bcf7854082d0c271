//! 选择器抽象
//!
//! 把语义名称（如 `job-status`、`error-message`）映射到两种边界上的具体查找方式：
//! - UI：CSS 选择器（统一使用 `data-testid`）
//! - API：响应体中的 JSON Pointer（可以有多个候选路径，按顺序尝试）
//!
//! 读取操作返回 `Option`，值不存在本身不是错误，由调用方决定是否符合预期

use std::fmt;

use phf::phf_map;
use serde_json::Value as JsonValue;

/// 语义元素
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Element {
    EmailInput,
    PasswordInput,
    LoginButton,
    LogoutButton,
    QuestionInput,
    CompanyInput,
    SubmitButton,
    Token,
    UserRole,
    UserId,
    UserEmail,
    ExpiresIn,
    JobId,
    JobStatus,
    SubmittedAt,
    Answer,
    Confidence,
    ErrorMessage,
    ErrorField,
    UploadForm,
    UploadInput,
    UploadButton,
    ProcessedRows,
    UploadErrors,
    RecentAnswers,
}

static ELEMENTS: phf::Map<&'static str, Element> = phf_map! {
    "email-input" => Element::EmailInput,
    "password-input" => Element::PasswordInput,
    "login-button" => Element::LoginButton,
    "logout-button" => Element::LogoutButton,
    "question-input" => Element::QuestionInput,
    "company-input" => Element::CompanyInput,
    "submit-button" => Element::SubmitButton,
    "token" => Element::Token,
    "user-role" => Element::UserRole,
    "user-id" => Element::UserId,
    "user-email" => Element::UserEmail,
    "expires-in" => Element::ExpiresIn,
    "job-id" => Element::JobId,
    "job-status" => Element::JobStatus,
    "submitted-at" => Element::SubmittedAt,
    "answer" => Element::Answer,
    "confidence" => Element::Confidence,
    "error-message" => Element::ErrorMessage,
    "error-field" => Element::ErrorField,
    "upload-form" => Element::UploadForm,
    "upload-input" => Element::UploadInput,
    "upload-button" => Element::UploadButton,
    "processed-rows" => Element::ProcessedRows,
    "upload-errors" => Element::UploadErrors,
    "recent-answers" => Element::RecentAnswers,
};

static UI_SELECTORS: phf::Map<&'static str, &'static str> = phf_map! {
    "email-input" => "[data-testid=\"email-input\"]",
    "password-input" => "[data-testid=\"password-input\"]",
    "login-button" => "[data-testid=\"login-button\"]",
    "logout-button" => "[data-testid=\"logout-button\"]",
    "question-input" => "[data-testid=\"question-input\"]",
    "company-input" => "[data-testid=\"company-input\"]",
    "submit-button" => "[data-testid=\"submit-question\"]",
    "user-role" => "[data-testid=\"user-role\"]",
    "job-id" => "[data-testid=\"job-id\"]",
    "job-status" => "[data-testid=\"job-status\"]",
    "submitted-at" => "[data-testid=\"submitted-at\"]",
    "answer" => "[data-testid=\"answer-text\"]",
    "confidence" => "[data-testid=\"confidence-score\"]",
    "error-message" => "[data-testid=\"error-message\"]",
    "upload-form" => "[data-testid=\"upload-form\"]",
    "upload-input" => "[data-testid=\"upload-input\"]",
    "upload-button" => "[data-testid=\"upload-button\"]",
    "processed-rows" => "[data-testid=\"processed-rows\"]",
    "upload-errors" => "[data-testid=\"upload-errors\"]",
};

impl Element {
    /// 按语义名称查找
    pub fn from_name(name: &str) -> Option<Self> {
        ELEMENTS.get(name).copied()
    }

    pub fn name(self) -> &'static str {
        ELEMENTS
            .entries()
            .find(|(_, el)| **el == self)
            .map(|(name, _)| *name)
            .unwrap_or("unknown")
    }

    /// UI 中的 CSS 选择器；令牌等不在页面上展示的元素没有选择器
    pub fn ui_selector(self) -> Option<&'static str> {
        UI_SELECTORS.get(self.name()).copied()
    }

    /// API 响应体中的候选 JSON Pointer
    pub fn api_pointers(self) -> &'static [&'static str] {
        match self {
            Self::Token => &["/token", "/accessToken"],
            Self::UserRole => &["/user/role", "/role"],
            Self::UserId => &["/user/id", "/userId"],
            Self::UserEmail => &["/user/email", "/email"],
            Self::ExpiresIn => &["/expiresIn", "/expires_in"],
            Self::JobId => &["/jobId", "/id"],
            Self::JobStatus => &["/status"],
            Self::SubmittedAt => &["/submittedAt"],
            Self::Answer => &["/answer", "/result/answer"],
            Self::Confidence => &["/confidence", "/result/confidence"],
            Self::ErrorMessage => &["/error", "/message", "/errors/0/message"],
            Self::ErrorField => &["/field", "/errors/0/field"],
            Self::ProcessedRows => &["/processedRows"],
            Self::UploadErrors => &["/errors"],
            Self::RecentAnswers => &["/answers"],
            _ => &[],
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 在 JSON 响应体中读取元素，`null` 视为不存在
pub fn read_json(body: &JsonValue, element: Element) -> Option<&JsonValue> {
    element
        .api_pointers()
        .iter()
        .filter_map(|p| body.pointer(p))
        .find(|v| !v.is_null())
}

/// 读取为文本；数字和布尔值转成字符串
pub fn read_json_text(body: &JsonValue, element: Element) -> Option<String> {
    match read_json(body, element)? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// 读取为数字；字符串形式的数字也接受
pub fn read_json_f64(body: &JsonValue, element: Element) -> Option<f64> {
    match read_json(body, element)? {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
