//! 访问控制与管理员上传场景

use tracing::info;

use crate::error::HarnessResult;
use crate::models::access::SAMPLE_COMPANIES_CSV;
use crate::models::{AccessOutcome, ProtectedResource, Role, UploadOutcome};
use crate::scenarios::ctx::ScenarioCtx;
use crate::services::AccessVerifier;

/// 分析师访问管理员上传入口被拒绝，管理员可以访问
pub async fn admin_upload_access(ctx: &mut ScenarioCtx<'_>) -> HarnessResult<()> {
    let resource = ProtectedResource::admin_upload(&ctx.config.routes.upload);

    for (role, expected) in [
        (Role::Analyst, AccessOutcome::Denied),
        (Role::Admin, AccessOutcome::Allowed),
    ] {
        ctx.login_as(role).await?;
        let actor = ctx.session.require_active()?;

        let decision = ctx.access.check_access(ctx.boundary, actor, &resource).await?;
        ctx.last_access = Some(decision.clone());
        let decision = AccessVerifier::require_conclusive(decision)?;
        ctx.checks.access_is(&decision, expected);

        ctx.session.end_session(ctx.boundary).await?;
    }
    Ok(())
}

/// 管理员上传 CSV 被处理，非 CSV 返回 415
pub async fn admin_upload_formats(ctx: &mut ScenarioCtx<'_>) -> HarnessResult<()> {
    let tag = ctx.to_string();
    ctx.login_as(Role::Admin).await?;
    let actor = ctx.session.require_active()?;

    match ctx
        .boundary
        .upload_companies(actor, "companies.csv", "text/csv", SAMPLE_COMPANIES_CSV)
        .await?
    {
        UploadOutcome::Accepted {
            processed_rows,
            errors,
        } => {
            info!("{} CSV 处理了 {} 行, {} 个错误", tag, processed_rows, errors.len());
            ctx.checks.check(
                "CSV 有行被处理或报告错误",
                processed_rows > 0 || !errors.is_empty(),
                "processedRows 为 0 且没有错误",
            );
        }
        other => {
            ctx.checks.check("CSV 上传被接受", false, format!("{:?}", other));
        }
    }

    match ctx
        .boundary
        .upload_companies(actor, "test.txt", "text/plain", "This is not a CSV file")
        .await?
    {
        UploadOutcome::UnsupportedMediaType { message } => {
            ctx.checks.check("非 CSV 返回 415", true, "");
            ctx.checks
                .message_contains("415 消息指出文件格式", &message, &["csv", "format"]);
        }
        other => {
            ctx.checks.check("非 CSV 返回 415", false, format!("{:?}", other));
        }
    }
    Ok(())
}
