//! 会话管理服务 - 业务能力层
//!
//! 只负责"以某个身份登录 / 登出"，不关心后续做什么

use tracing::{debug, info, warn};

use crate::boundary::{LoginResponse, QaBoundary};
use crate::error::{HarnessError, HarnessResult};
use crate::models::{Actor, AuthFailure, AuthFailureReason, Credential, LoginProfile};

/// 会话管理器
///
/// 职责：
/// - 独占当前场景的 Actor 及其令牌
/// - 同一时刻最多一个活动 Actor
/// - 不与其他场景共享任何状态
#[derive(Debug, Default)]
pub struct SessionManager {
    active: Option<Actor>,
    /// 活动 Actor 登录时边界返回的用户信息
    profile: Option<LoginProfile>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登录并把结果设为活动 Actor
    ///
    /// 已有活动 Actor 时先结束它的会话。
    ///
    /// # 返回
    /// 成功返回活动 Actor；凭据被拒绝返回 `Auth(InvalidCredentials)`，
    /// 消息为边界原样返回的文本
    pub async fn authenticate<B>(&mut self, boundary: &B, credential: &Credential) -> HarnessResult<&Actor>
    where
        B: QaBoundary + ?Sized,
    {
        if self.active.is_some() {
            debug!("已有活动会话，先结束");
            self.end_session(boundary).await?;
        }

        info!("🔑 以 {} 身份登录: {}", credential.role, credential.email);
        match boundary.login(credential).await? {
            LoginResponse::Granted {
                token,
                role,
                profile,
            } => {
                if let Some(role) = role {
                    if role != credential.role {
                        warn!("⚠️ 登录成功但角色为 {}，期望 {}", role, credential.role);
                        if let Err(e) = boundary.logout(&token).await {
                            warn!("释放角色不符的令牌失败: {}", e);
                        }
                        return Err(HarnessError::Auth(AuthFailure {
                            reason: AuthFailureReason::RoleMismatch,
                            status: None,
                            message: format!("期望角色 {}，边界返回 {}", credential.role, role),
                        }));
                    }
                }

                info!("✓ 登录成功: {}", credential.email);
                let actor = Actor::authenticated(credential.role, credential.email.clone(), token);
                self.profile = Some(profile);
                Ok(self.active.insert(actor))
            }
            LoginResponse::Rejected { status, message } => {
                info!("✗ 登录被拒绝: {}", message);
                Err(HarnessError::Auth(AuthFailure {
                    reason: AuthFailureReason::InvalidCredentials,
                    status,
                    message,
                }))
            }
        }
    }

    /// 结束当前会话并释放令牌
    ///
    /// 幂等：没有活动会话时直接返回成功，不调用边界
    pub async fn end_session<B>(&mut self, boundary: &B) -> HarnessResult<()>
    where
        B: QaBoundary + ?Sized,
    {
        self.profile = None;
        let Some(mut actor) = self.active.take() else {
            debug!("没有活动会话，跳过登出");
            return Ok(());
        };

        match actor.release_token() {
            Some(token) => {
                boundary.logout(&token).await?;
                info!("👋 已登出: {}", actor);
            }
            None => debug!("{} 没有令牌，无需登出", actor),
        }
        Ok(())
    }

    pub fn profile(&self) -> Option<&LoginProfile> {
        self.profile.as_ref()
    }

    pub fn active(&self) -> Option<&Actor> {
        self.active.as_ref()
    }

    /// 获取活动 Actor，没有时返回 `Auth(MissingToken)`
    pub fn require_active(&self) -> HarnessResult<&Actor> {
        self.active.as_ref().ok_or_else(|| {
            HarnessError::Auth(AuthFailure {
                reason: AuthFailureReason::MissingToken,
                status: None,
                message: "当前没有已登录的 Actor".to_string(),
            })
        })
    }
}
