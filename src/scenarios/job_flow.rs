//! 任务生命周期相关场景
//!
//! 提交 → 观测 → 断言，以及各种提交被拒绝的情况

use tracing::{info, warn};
use uuid::Uuid;

use crate::boundary::SubmitResponse;
use crate::config::BoundaryKind;
use crate::error::{HarnessError, HarnessResult};
use crate::models::{
    Actor, AuthFailureReason, CapabilityToken, JobResult, JobState, QuestionPayload, Role,
    Submission, ValidationOutcome,
};
use crate::report::Checks;
use crate::scenarios::ctx::ScenarioCtx;
use crate::utils::logging::truncate_text;

/// 提交有效问题并观测到终态
pub async fn submit_and_observe(ctx: &mut ScenarioCtx<'_>) -> HarnessResult<()> {
    let tag = ctx.to_string();
    ctx.login_as(Role::Analyst).await?;

    let payload = ctx.config.sample.valid_payload();
    submit_then_observe(ctx, &tag, &payload).await
}

/// 提交后若被受理则观测到终态并校验结果
async fn submit_then_observe(
    ctx: &mut ScenarioCtx<'_>,
    tag: &str,
    payload: &QuestionPayload,
) -> HarnessResult<()> {
    let actor = ctx.session.require_active()?;
    let submission = ctx.gateway.submit(ctx.boundary, actor, payload).await?;

    let handle = match submission {
        Submission::Accepted(handle) => handle,
        Submission::Rejected(outcome) => {
            ctx.checks.check("问题被受理", false, outcome.to_string());
            return Ok(());
        }
    };

    info!("{} 📋 已提交: {}", tag, handle);
    ctx.checks.uuid("jobId 为规范 UUID", handle.id().as_str());
    ctx.checks.state_is("初始状态为 queued", handle.state(), &[JobState::Queued]);

    let handle = ctx.last_job.insert(handle);
    let outcome = ctx.engine.observe(ctx.boundary, actor, handle).await?;
    ctx.history = outcome.history.clone();

    ctx.checks.state_is(
        "在预算内进入终态",
        outcome.final_state,
        &[JobState::Done, JobState::Failed],
    );
    match (&outcome.final_state, &outcome.result) {
        (JobState::Done, Some(result)) => {
            check_done_result(&mut ctx.checks, payload, result);
            info!("{} ✅ 任务完成, confidence = {}", tag, result.confidence);
        }
        (JobState::Done, None) => {
            ctx.checks.check("done 任务带有结果", false, "没有结果");
        }
        _ => {
            warn!(
                "{} ⚠️ 任务以 failed 结束: {}",
                tag,
                outcome.message.as_deref().unwrap_or("(无消息)")
            );
        }
    }
    Ok(())
}

/// 校验 done 结果；边界回显了问题或公司时必须与提交的一致
fn check_done_result(checks: &mut Checks, payload: &QuestionPayload, result: &JobResult) {
    checks.check("answer 非空", !result.answer.trim().is_empty(), "answer 为空");
    checks.confidence_in_range(result);
    if let Some(echoed) = &result.question {
        checks.check(
            "回显的问题与提交一致",
            *echoed == payload.question,
            format!("回显 {:?}", truncate_text(echoed, 60)),
        );
    }
    if let Some(echoed) = &result.company {
        checks.check(
            "回显的公司与提交一致",
            payload.company.as_ref() == Some(echoed),
            format!("回显 {:?}, 提交 {:?}", echoed, payload.company),
        );
    }
}

/// 期望提交被拒绝，返回拒绝结果供进一步断言
fn expect_rejection(
    ctx: &mut ScenarioCtx<'_>,
    submission: Submission,
    expected_field: &str,
) -> Option<ValidationOutcome> {
    match submission {
        Submission::Rejected(outcome) => {
            ctx.checks.check(
                format!("拒绝字段为 {}", expected_field),
                outcome.field == expected_field,
                format!("实际字段 {}", outcome.field),
            );
            ctx.checks.check("未创建任务", true, "");
            Some(outcome)
        }
        Submission::Accepted(handle) => {
            ctx.checks.check("未创建任务", false, format!("边界受理了提交: {}", handle));
            ctx.last_job = Some(handle);
            None
        }
    }
}

/// 空问题必须被拒绝，消息指出问题为必填
pub async fn empty_question(ctx: &mut ScenarioCtx<'_>) -> HarnessResult<()> {
    ctx.login_as(Role::Analyst).await?;
    let actor = ctx.session.require_active()?;

    let payload = QuestionPayload::new("", &ctx.config.sample.valid_company);
    let submission = ctx.gateway.submit(ctx.boundary, actor, &payload).await?;

    if let Some(outcome) = expect_rejection(ctx, submission, "question") {
        ctx.checks
            .message_contains("消息指出必填", &outcome.message, &["required"]);
        if let Some(status) = outcome.status {
            ctx.checks.check("HTTP 400", status == 400, format!("HTTP {}", status));
        }
    }
    Ok(())
}

/// 缺少公司字段必须被拒绝
pub async fn missing_company(ctx: &mut ScenarioCtx<'_>) -> HarnessResult<()> {
    ctx.login_as(Role::Analyst).await?;
    let actor = ctx.session.require_active()?;

    let payload = QuestionPayload::without_company(&ctx.config.sample.valid_question);
    let submission = ctx.gateway.submit(ctx.boundary, actor, &payload).await?;

    if let Some(outcome) = expect_rejection(ctx, submission, "company") {
        ctx.checks
            .message_contains("消息提到公司", &outcome.message, &["company"]);
    }
    Ok(())
}

/// 超过长度上限的问题必须被拒绝（400 或 413）
pub async fn long_question(ctx: &mut ScenarioCtx<'_>) -> HarnessResult<()> {
    ctx.login_as(Role::Analyst).await?;
    let actor = ctx.session.require_active()?;

    let question = "A".repeat(ctx.config.max_question_chars + 1);
    let payload = QuestionPayload::new(question, &ctx.config.sample.valid_company);
    let submission = ctx.gateway.submit(ctx.boundary, actor, &payload).await?;

    if let Some(outcome) = expect_rejection(ctx, submission, "question") {
        if let Some(status) = outcome.status {
            ctx.checks.check(
                "HTTP 400 或 413",
                status == 400 || status == 413,
                format!("HTTP {}", status),
            );
        }
    }
    Ok(())
}

/// Unicode 与特殊字符问题：受理时必须正常走完生命周期，拒绝时必须是校验错误
pub async fn unicode_question(ctx: &mut ScenarioCtx<'_>) -> HarnessResult<()> {
    let tag = ctx.to_string();
    ctx.login_as(Role::Analyst).await?;

    let sample = &ctx.config.sample;
    let payloads = [
        QuestionPayload::new(&sample.unicode_question, &sample.unicode_company),
        QuestionPayload::new(&sample.special_question, &sample.valid_company),
    ];

    for payload in &payloads {
        let actor = ctx.session.require_active()?;
        let submission = ctx.gateway.submit(ctx.boundary, actor, payload).await?;
        match submission {
            Submission::Accepted(handle) => {
                info!("{} 非 ASCII 问题被受理，继续观测", tag);
                ctx.checks.uuid("jobId 为规范 UUID", handle.id().as_str());
                let handle = ctx.last_job.insert(handle);
                let outcome = ctx.engine.observe(ctx.boundary, actor, handle).await?;
                ctx.history = outcome.history.clone();
                ctx.checks.state_is(
                    "进入终态",
                    outcome.final_state,
                    &[JobState::Done, JobState::Failed],
                );
                if let Some(result) = &outcome.result {
                    check_done_result(&mut ctx.checks, payload, result);
                }
            }
            Submission::Rejected(outcome) => {
                info!("{} 非 ASCII 问题被拒绝: {}", tag, outcome);
                ctx.checks.check(
                    "拒绝为校验错误",
                    outcome.status.map_or(true, |s| s == 400),
                    outcome.to_string(),
                );
                ctx.checks.check("拒绝带有消息", !outcome.message.is_empty(), "消息为空");
            }
        }
    }
    Ok(())
}

/// 没有令牌或令牌伪造时提交必须被拒绝
pub async fn unauthenticated_submit(ctx: &mut ScenarioCtx<'_>) -> HarnessResult<()> {
    let payload = ctx.config.sample.valid_payload();
    let attempts = [
        (
            Actor::anonymous(Role::Analyst),
            AuthFailureReason::MissingToken,
        ),
        (
            Actor::forged(Role::Analyst, CapabilityToken::Bearer("invalid-token".to_string())),
            AuthFailureReason::Unauthorized,
        ),
    ];

    for (actor, expected) in &attempts {
        match ctx.gateway.submit(ctx.boundary, actor, &payload).await {
            Err(HarnessError::Auth(failure)) => {
                ctx.checks.check(
                    format!("{:?} 提交被拒绝", expected),
                    failure.reason == *expected,
                    failure.to_string(),
                );
                if let Some(status) = failure.status {
                    ctx.checks.check("HTTP 401", status == 401, format!("HTTP {}", status));
                }
            }
            Ok(Submission::Accepted(handle)) => {
                ctx.checks
                    .check(format!("{:?} 提交被拒绝", expected), false, format!("任务被创建: {}", handle));
                ctx.last_job = Some(handle);
            }
            Ok(Submission::Rejected(outcome)) => {
                ctx.checks.check(
                    format!("{:?} 提交被拒绝", expected),
                    false,
                    format!("拒绝理由是校验而不是认证: {}", outcome),
                );
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// 不存在的任务返回 404，非法 ID 返回 400（仅 API）
pub async fn unknown_job_lookup(ctx: &mut ScenarioCtx<'_>) -> HarnessResult<()> {
    if ctx.boundary.kind() != BoundaryKind::Api {
        ctx.skip("按原始 ID 查询任务只在 API 边界可用");
        return Ok(());
    }

    ctx.login_as(Role::Analyst).await?;
    let actor = ctx.session.require_active()?;

    let unknown = Uuid::new_v4().to_string();
    match ctx.boundary.lookup_raw(actor, &unknown).await {
        Err(HarnessError::JobNotFound { .. }) => {
            ctx.checks.check("不存在的任务返回 404", true, unknown);
        }
        Ok(snapshot) => {
            ctx.checks.check(
                "不存在的任务返回 404",
                false,
                format!("边界返回了状态 {}", snapshot.state),
            );
        }
        Err(e) => return Err(e),
    }

    match ctx.boundary.lookup_raw(actor, "invalid-uuid").await {
        Err(HarnessError::Protocol { field, message }) => {
            ctx.checks.check("非法 ID 返回 400", field == "jobId", message);
        }
        Ok(snapshot) => {
            ctx.checks.check(
                "非法 ID 返回 400",
                false,
                format!("边界返回了状态 {}", snapshot.state),
            );
        }
        Err(HarnessError::JobNotFound { .. }) => {
            ctx.checks.check("非法 ID 返回 400", false, "边界返回 404 而不是 400");
        }
        Err(e) => return Err(e),
    }
    Ok(())
}

/// 最近回答列表的长度上限
pub const MAX_RECENT_ANSWERS: usize = 10;

/// 最近回答最多 10 条，每条带完整的问题、公司和时间戳（仅 API）
pub async fn recent_answers(ctx: &mut ScenarioCtx<'_>) -> HarnessResult<()> {
    if ctx.boundary.kind() != BoundaryKind::Api {
        ctx.skip("最近回答列表只在 API 边界可用");
        return Ok(());
    }

    ctx.login_as(Role::Analyst).await?;
    let actor = ctx.session.require_active()?;

    let answers = ctx.boundary.recent_answers(actor).await?;
    ctx.checks.check(
        format!("最多 {} 条", MAX_RECENT_ANSWERS),
        answers.len() <= MAX_RECENT_ANSWERS,
        format!("返回 {} 条", answers.len()),
    );
    for (i, item) in answers.iter().enumerate() {
        let missing: Vec<&str> = [
            ("question", item.question.is_none()),
            ("company", item.company.is_none()),
            ("timestamp", item.timestamp.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();
        ctx.checks.check(
            format!("第 {} 条字段完整", i + 1),
            missing.is_empty(),
            format!("缺少 {:?}", missing),
        );
        ctx.checks.confidence_in_range(item);
    }
    Ok(())
}

/// 格式错误的 JSON 请求体必须得到 400（仅 API）
pub async fn malformed_json(ctx: &mut ScenarioCtx<'_>) -> HarnessResult<()> {
    if ctx.boundary.kind() != BoundaryKind::Api {
        ctx.skip("原始请求体只能通过 API 边界提交");
        return Ok(());
    }

    ctx.login_as(Role::Analyst).await?;
    let actor = ctx.session.require_active()?;

    match ctx.boundary.submit_raw(actor, "invalid json").await? {
        SubmitResponse::Rejected { status, message, .. } => {
            ctx.checks.check(
                "HTTP 400",
                status == Some(400),
                format!("HTTP {:?}: {}", status, message),
            );
        }
        SubmitResponse::Accepted { job_id, .. } => {
            ctx.checks
                .check("格式错误的请求体被拒绝", false, format!("边界受理并返回任务 {}", job_id));
        }
    }
    Ok(())
}
