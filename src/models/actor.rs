//! 身份模型
//!
//! 角色、凭据、能力令牌与测试中的 Actor

use std::fmt;

use serde::{Deserialize, Serialize};

/// 角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Analyst,
    Admin,
}

impl Role {
    /// 解析边界返回的角色名（不区分大小写）
    pub fn from_str(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "analyst" => Some(Self::Analyst),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Analyst => "Analyst",
            Self::Admin => "Admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 登录凭据
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// 期望登录后得到的角色
    pub role: Role,
    pub email: String,
    pub password: String,
}

impl Credential {
    pub fn new(role: Role, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            role,
            email: email.into(),
            password: password.into(),
        }
    }

    /// 同一账号换一个密码，用于错误密码场景
    pub fn with_password(&self, password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            ..self.clone()
        }
    }
}

// 密码不进日志
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("role", &self.role)
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

/// 能力令牌
///
/// API 边界使用 Bearer token，UI 边界使用会话 cookie
#[derive(Clone, PartialEq, Eq)]
pub enum CapabilityToken {
    Bearer(String),
    Cookie(String),
}

impl CapabilityToken {
    pub fn value(&self) -> &str {
        match self {
            Self::Bearer(v) | Self::Cookie(v) => v,
        }
    }
}

impl fmt::Debug for CapabilityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Bearer(_) => "Bearer",
            Self::Cookie(_) => "Cookie",
        };
        write!(f, "{}(<{} 字节>)", kind, self.value().len())
    }
}

/// 已认证的测试参与者
///
/// 令牌由 `SessionManager` 独占管理，结束会话后变为 `None`
#[derive(Debug, Clone)]
pub struct Actor {
    role: Role,
    email: String,
    token: Option<CapabilityToken>,
}

impl Actor {
    pub(crate) fn authenticated(role: Role, email: impl Into<String>, token: CapabilityToken) -> Self {
        Self {
            role,
            email: email.into(),
            token: Some(token),
        }
    }

    /// 构造一个持有伪造令牌的 Actor，用于未授权请求场景
    pub fn forged(role: Role, token: CapabilityToken) -> Self {
        Self {
            role,
            email: "forged@invalid".to_string(),
            token: Some(token),
        }
    }

    /// 构造一个没有令牌的匿名 Actor
    pub fn anonymous(role: Role) -> Self {
        Self {
            role,
            email: "anonymous@invalid".to_string(),
            token: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn token(&self) -> Option<&CapabilityToken> {
        self.token.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub(crate) fn release_token(&mut self) -> Option<CapabilityToken> {
        self.token.take()
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<{}>", self.role, self.email)
    }
}

/// 登录响应里附带的用户信息
///
/// 只有 API 边界能读到；UI 边界登录后各字段为 `None`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginProfile {
    pub user_id: Option<String>,
    pub email: Option<String>,
    /// 令牌有效期（秒）
    pub expires_in: Option<u64>,
}

/// 认证失败原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuthFailureReason {
    /// 登录时凭据被拒绝
    InvalidCredentials,
    /// 请求未携带令牌
    MissingToken,
    /// 令牌被拒绝（伪造或已失效）
    Unauthorized,
    /// 登录成功但角色与期望不符
    RoleMismatch,
}

/// 认证失败，携带边界返回的原始消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthFailure {
    pub reason: AuthFailureReason,
    pub status: Option<u16>,
    pub message: String,
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{:?} (HTTP {}): {}", self.reason, status, self.message),
            None => write!(f, "{:?}: {}", self.reason, self.message),
        }
    }
}
