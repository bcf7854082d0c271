//! 登录与会话相关场景

use tracing::info;

use crate::config::BoundaryKind;
use crate::error::{HarnessError, HarnessResult};
use crate::models::{AuthFailureReason, Credential, Role};
use crate::scenarios::ctx::ScenarioCtx;

/// 错误密码和不存在的账号都必须得到凭据错误，且不发放令牌
pub async fn invalid_login(ctx: &mut ScenarioCtx<'_>) -> HarnessResult<()> {
    let tag = ctx.to_string();
    let attempts = [
        ("错误密码", ctx.config.analyst.with_password("wrongpassword")),
        (
            "不存在的账号",
            Credential::new(Role::Analyst, "nonexistent@test.com", "TestPass123!"),
        ),
    ];

    for (label, credential) in &attempts {
        match ctx.session.authenticate(ctx.boundary, credential).await {
            Err(HarnessError::Auth(failure)) => {
                info!("{} {} 被拒绝: {}", tag, label, failure);
                ctx.checks.check(
                    format!("{}: 原因为凭据无效", label),
                    failure.reason == AuthFailureReason::InvalidCredentials,
                    failure.to_string(),
                );
                ctx.checks.message_contains(
                    &format!("{}: 消息指出凭据无效", label),
                    &failure.message,
                    &["invalid", "incorrect", "credentials"],
                );
            }
            Ok(actor) => {
                let detail = format!("登录成功: {}", actor);
                ctx.checks.check(format!("{}: 登录被拒绝", label), false, detail);
            }
            Err(e) => return Err(e),
        }
        ctx.checks.check(
            format!("{}: 未发放令牌", label),
            ctx.session.active().is_none(),
            "会话中存在活动 Actor",
        );
        ctx.session.end_session(ctx.boundary).await?;
    }
    Ok(())
}

/// 重复结束会话不报错，也不再改变状态
pub async fn session_end_idempotent(ctx: &mut ScenarioCtx<'_>) -> HarnessResult<()> {
    ctx.login_as(Role::Analyst).await?;
    ctx.checks.check(
        "登录后持有令牌",
        ctx.session.active().is_some_and(|a| a.is_authenticated()),
        "没有令牌",
    );

    let first = ctx.session.end_session(ctx.boundary).await;
    ctx.checks.check(
        "第一次结束会话成功",
        first.is_ok(),
        first.err().map(|e| e.to_string()).unwrap_or_default(),
    );

    let second = ctx.session.end_session(ctx.boundary).await;
    ctx.checks.check(
        "第二次结束会话不报错",
        second.is_ok(),
        second.err().map(|e| e.to_string()).unwrap_or_default(),
    );

    ctx.checks.check(
        "结束后没有活动 Actor",
        ctx.session.require_active().is_err(),
        "仍存在活动 Actor",
    );
    Ok(())
}

/// 登录响应带有用户 ID、与登录一致的邮箱和令牌有效期（仅 API）
pub async fn login_response_shape(ctx: &mut ScenarioCtx<'_>) -> HarnessResult<()> {
    if ctx.boundary.kind() != BoundaryKind::Api {
        ctx.skip("UI 边界读不到登录响应体");
        return Ok(());
    }

    ctx.login_as(Role::Analyst).await?;
    let expected_email = ctx.config.credential_for(Role::Analyst).email.clone();
    let profile = ctx.session.profile().cloned().unwrap_or_default();

    match &profile.user_id {
        Some(id) => {
            ctx.checks.uuid("user.id 为规范 UUID", id);
        }
        None => {
            ctx.checks.check("登录响应带有 user.id", false, "缺少 user.id");
        }
    }
    ctx.checks.check(
        "user.email 与登录邮箱一致",
        profile.email.as_deref() == Some(expected_email.as_str()),
        format!("返回 {:?}, 登录 {}", profile.email, expected_email),
    );
    ctx.checks.check(
        "登录响应带有 expiresIn",
        profile.expires_in.is_some(),
        "缺少 expiresIn",
    );
    Ok(())
}
