//! 场景层
//!
//! 定义"一个场景"的完整步骤。每个场景严格按顺序执行，不持有浏览器等资源，
//! 只依赖边界契约和业务能力（services）

pub mod access_flow;
pub mod auth_flow;
pub mod ctx;
pub mod job_flow;

pub use ctx::ScenarioCtx;

use std::fmt;
use std::sync::Arc;

use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::boundary::QaBoundary;
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{HarnessError, HarnessResult};
use crate::report::{ScenarioReport, Verdict};

/// 场景目录
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    SubmitAndObserve,
    EmptyQuestion,
    MissingCompany,
    LongQuestion,
    UnicodeQuestion,
    InvalidLogin,
    SessionEndIdempotent,
    AdminUploadAccess,
    AdminUploadFormats,
    UnauthenticatedSubmit,
    UnknownJobLookup,
    RecentAnswers,
    MalformedJson,
    LoginResponseShape,
}

impl Scenario {
    pub fn name(self) -> &'static str {
        match self {
            Self::SubmitAndObserve => "submit-and-observe",
            Self::EmptyQuestion => "empty-question",
            Self::MissingCompany => "missing-company",
            Self::LongQuestion => "long-question",
            Self::UnicodeQuestion => "unicode-question",
            Self::InvalidLogin => "invalid-login",
            Self::SessionEndIdempotent => "session-end-idempotent",
            Self::AdminUploadAccess => "admin-upload-access",
            Self::AdminUploadFormats => "admin-upload-formats",
            Self::UnauthenticatedSubmit => "unauthenticated-submit",
            Self::UnknownJobLookup => "unknown-job-lookup",
            Self::RecentAnswers => "recent-answers",
            Self::MalformedJson => "malformed-json",
            Self::LoginResponseShape => "login-response-shape",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        catalogue().into_iter().find(|s| s.name() == name.trim())
    }

    async fn execute(self, ctx: &mut ScenarioCtx<'_>) -> HarnessResult<()> {
        match self {
            Self::SubmitAndObserve => job_flow::submit_and_observe(ctx).await,
            Self::EmptyQuestion => job_flow::empty_question(ctx).await,
            Self::MissingCompany => job_flow::missing_company(ctx).await,
            Self::LongQuestion => job_flow::long_question(ctx).await,
            Self::UnicodeQuestion => job_flow::unicode_question(ctx).await,
            Self::InvalidLogin => auth_flow::invalid_login(ctx).await,
            Self::SessionEndIdempotent => auth_flow::session_end_idempotent(ctx).await,
            Self::AdminUploadAccess => access_flow::admin_upload_access(ctx).await,
            Self::AdminUploadFormats => access_flow::admin_upload_formats(ctx).await,
            Self::UnauthenticatedSubmit => job_flow::unauthenticated_submit(ctx).await,
            Self::UnknownJobLookup => job_flow::unknown_job_lookup(ctx).await,
            Self::RecentAnswers => job_flow::recent_answers(ctx).await,
            Self::MalformedJson => job_flow::malformed_json(ctx).await,
            Self::LoginResponseShape => auth_flow::login_response_shape(ctx).await,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 全部场景，按执行顺序
pub fn catalogue() -> Vec<Scenario> {
    vec![
        Scenario::SubmitAndObserve,
        Scenario::EmptyQuestion,
        Scenario::MissingCompany,
        Scenario::LongQuestion,
        Scenario::UnicodeQuestion,
        Scenario::InvalidLogin,
        Scenario::SessionEndIdempotent,
        Scenario::AdminUploadAccess,
        Scenario::AdminUploadFormats,
        Scenario::UnauthenticatedSubmit,
        Scenario::UnknownJobLookup,
        Scenario::RecentAnswers,
        Scenario::MalformedJson,
        Scenario::LoginResponseShape,
    ]
}

/// 运行单个场景
///
/// 整个场景受 `scenario_timeout` 约束；超时时放弃进行中的请求，
/// 报告保留最后已知的任务状态。无论结果如何都会结束会话
pub async fn run_scenario(
    scenario: Scenario,
    boundary: &dyn QaBoundary,
    config: &Config,
    clock: Arc<dyn Clock>,
) -> ScenarioReport {
    let mut ctx = ScenarioCtx::new(scenario.name(), config, boundary, clock);
    let tag = ctx.to_string();
    let budget = config.scenario_timeout();
    let started = Instant::now();
    info!("{} ▶️ 开始", tag);

    let result = match timeout(budget, scenario.execute(&mut ctx)).await {
        Ok(result) => result,
        Err(_) => {
            warn!("{} ⏰ 场景超时 ({}ms)", tag, budget.as_millis());
            Err(HarnessError::ScenarioTimeout {
                scenario: scenario.name().to_string(),
                budget,
            })
        }
    };

    if let Err(e) = &result {
        if e.is_fatal() {
            warn!("{} 💥 致命错误，场景终止: {}", tag, e);
        } else {
            debug!("{} 场景中止: {}", tag, e);
        }
    }

    match timeout(config.request_timeout(), ctx.session.end_session(boundary)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("{} 结束会话失败: {}", tag, e),
        Err(_) => warn!("{} 结束会话超时", tag),
    }

    let report = ctx.into_report(result, started.elapsed());
    match report.verdict {
        Verdict::Pass => info!("{} ✅ 通过 ({}ms)", tag, report.duration.as_millis()),
        Verdict::Skipped => info!(
            "{} ⏭️ 跳过: {}",
            tag,
            report.skip_reason.as_deref().unwrap_or("")
        ),
        Verdict::Fail => warn!("{} ❌ 失败: {}", tag, report.summary_line()),
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::scripted::ScriptedBoundary;
    use crate::boundary::{LoginResponse, SubmitResponse};
    use crate::clock::ManualClock;
    use crate::config::BoundaryKind;
    use crate::models::{
        AccessEvidence, CapabilityToken, JobResult, JobState, LoginProfile, Role, StatusSnapshot,
        UploadOutcome,
    };

    const JOB_ID: &str = "3f2b8c1e-9a4d-4e7f-8b21-0c6d5e4f3a2b";

    fn granted(role: Role) -> LoginResponse {
        LoginResponse::Granted {
            token: CapabilityToken::Bearer(format!("{}-token", role)),
            role: Some(role),
            profile: LoginProfile {
                user_id: Some("7c9e6679-7425-40de-944b-e07fc1f90ae7".to_string()),
                email: Some(format!("{}@test.com", role.to_string().to_lowercase())),
                expires_in: Some(3600),
            },
        }
    }

    fn done(result: JobResult) -> StatusSnapshot {
        StatusSnapshot {
            state: JobState::Done,
            result: Some(result),
            message: None,
        }
    }

    fn answer(question: Option<&str>, company: Option<&str>) -> JobResult {
        JobResult {
            answer: "Nokia reported 12,300 tCO2e.".to_string(),
            confidence: 0.82,
            question: question.map(str::to_string),
            company: company.map(str::to_string),
            timestamp: None,
        }
    }

    fn queued() -> SubmitResponse {
        SubmitResponse::Accepted {
            job_id: JOB_ID.to_string(),
            status: "queued".to_string(),
            submitted_at: Some("2024-05-01T10:20:30Z".to_string()),
        }
    }

    async fn run(scenario: Scenario, boundary: &ScriptedBoundary) -> ScenarioReport {
        run_scenario(
            scenario,
            boundary,
            &Config::default(),
            Arc::new(ManualClock::new()),
        )
        .await
    }

    #[test]
    fn test_catalogue_names_are_unique() {
        let names: std::collections::HashSet<_> = catalogue().iter().map(|s| s.name()).collect();
        assert_eq!(names.len(), catalogue().len());
        assert_eq!(Scenario::from_name("long-question"), Some(Scenario::LongQuestion));
        assert_eq!(Scenario::from_name("nope"), None);
    }

    #[tokio::test]
    async fn test_submit_and_observe_passes_on_done() {
        let boundary = ScriptedBoundary::new()
            .with_login(granted(Role::Analyst))
            .with_submit(queued())
            .with_states(&[JobState::Queued, JobState::Processing])
            .with_snapshot(StatusSnapshot {
                state: JobState::Done,
                result: Some(JobResult {
                    answer: "Nokia reported 12,300 tCO2e.".to_string(),
                    confidence: 0.82,
                    question: None,
                    company: None,
                    timestamp: None,
                }),
                message: None,
            });

        let report = run(Scenario::SubmitAndObserve, &boundary).await;

        assert_eq!(report.verdict, Verdict::Pass, "{}", report.summary_line());
        assert_eq!(report.last_job.unwrap().state(), JobState::Done);
        assert!(!report.history.is_empty());
        assert_eq!(boundary.logout_count(), 1);
    }

    #[tokio::test]
    async fn test_submit_and_observe_fails_on_regression() {
        let boundary = ScriptedBoundary::new()
            .with_login(granted(Role::Analyst))
            .with_submit(queued())
            .with_states(&[JobState::Processing, JobState::Queued]);

        let report = run(Scenario::SubmitAndObserve, &boundary).await;

        assert_eq!(report.verdict, Verdict::Fail);
        assert!(report.error.unwrap().contains("状态非单调"));
        assert_eq!(report.history.len(), 2);
        assert_eq!(boundary.logout_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_question_passes_on_rejection() {
        let boundary = ScriptedBoundary::new()
            .with_login(granted(Role::Analyst))
            .with_submit(SubmitResponse::Rejected {
                status: Some(400),
                field: None,
                message: "Question is required".to_string(),
            });

        let report = run(Scenario::EmptyQuestion, &boundary).await;
        assert_eq!(report.verdict, Verdict::Pass, "{}", report.summary_line());
        assert!(report.last_job.is_none());
    }

    #[tokio::test]
    async fn test_long_question_accepted_fails() {
        let boundary = ScriptedBoundary::new()
            .with_login(granted(Role::Analyst))
            .with_submit(queued());

        let report = run(Scenario::LongQuestion, &boundary).await;
        assert_eq!(report.verdict, Verdict::Fail);
        assert!(report.last_job.is_some());
    }

    #[tokio::test]
    async fn test_invalid_login_passes() {
        let boundary = ScriptedBoundary::new().with_login(LoginResponse::Rejected {
            status: Some(401),
            message: "Invalid credentials".to_string(),
        });

        let report = run(Scenario::InvalidLogin, &boundary).await;
        assert_eq!(report.verdict, Verdict::Pass, "{}", report.summary_line());
        assert_eq!(boundary.logout_count(), 0);
    }

    #[tokio::test]
    async fn test_admin_upload_access_uses_both_roles() {
        let boundary = ScriptedBoundary::new()
            .with_login(granted(Role::Analyst))
            .with_login(granted(Role::Admin))
            .with_access(AccessEvidence::Http {
                status: 403,
                location: None,
                body_excerpt: "Forbidden".to_string(),
            });

        // 两个角色看到同样的 403，管理员那一步必须失败
        let report = run(Scenario::AdminUploadAccess, &boundary).await;
        assert_eq!(report.verdict, Verdict::Fail);
        assert_eq!(report.checks.len(), 2);
        assert!(report.checks[0].passed);
        assert!(!report.checks[1].passed);
        assert_eq!(boundary.logout_count(), 2);
    }

    #[tokio::test]
    async fn test_ambiguous_access_fails_scenario() {
        let boundary = ScriptedBoundary::new()
            .with_login(granted(Role::Analyst))
            .with_access(AccessEvidence::Http {
                status: 500,
                location: None,
                body_excerpt: String::new(),
            });

        let report = run(Scenario::AdminUploadAccess, &boundary).await;
        assert_eq!(report.verdict, Verdict::Fail);
        assert!(report.error.unwrap().contains("访问判定不明确"));
        assert!(report.last_access.is_some());
    }

    #[tokio::test]
    async fn test_unknown_job_lookup_skipped_on_ui() {
        let boundary = ScriptedBoundary::new().with_kind(BoundaryKind::Ui);
        let report = run(Scenario::UnknownJobLookup, &boundary).await;
        assert_eq!(report.verdict, Verdict::Skipped);
    }

    #[tokio::test]
    async fn test_unknown_job_lookup_on_api() {
        let boundary = ScriptedBoundary::new()
            .with_login(granted(Role::Analyst))
            .with_lookup(Err(HarnessError::JobNotFound {
                job_id: String::new(),
            }))
            .with_lookup(Err(HarnessError::protocol("jobId", "Invalid job ID format")));

        let report = run(Scenario::UnknownJobLookup, &boundary).await;
        assert_eq!(report.verdict, Verdict::Pass, "{}", report.summary_line());
        assert_eq!(report.checks.len(), 2);
    }

    #[tokio::test]
    async fn test_scenario_without_checks_is_not_pass() {
        let boundary = ScriptedBoundary::new();
        let report = run(Scenario::SubmitAndObserve, &boundary).await;
        assert_eq!(report.verdict, Verdict::Fail);
        assert!(report.error.is_some());
    }

    #[tokio::test]
    async fn test_echoed_company_mismatch_fails() {
        let boundary = ScriptedBoundary::new()
            .with_login(granted(Role::Analyst))
            .with_submit(queued())
            .with_states(&[JobState::Processing])
            .with_snapshot(done(answer(Some("another question"), Some("Apple"))));

        let report = run(Scenario::SubmitAndObserve, &boundary).await;
        assert_eq!(report.verdict, Verdict::Fail);
        let failed: Vec<_> = report.checks.iter().filter(|c| !c.passed).map(|c| c.name.as_str()).collect();
        assert_eq!(failed, vec!["回显的问题与提交一致", "回显的公司与提交一致"]);
    }

    #[tokio::test]
    async fn test_matching_echo_passes() {
        let config = Config::default();
        let boundary = ScriptedBoundary::new()
            .with_login(granted(Role::Analyst))
            .with_submit(queued())
            .with_snapshot(done(answer(
                Some(config.sample.valid_question.as_str()),
                Some(config.sample.valid_company.as_str()),
            )));

        let report = run(Scenario::SubmitAndObserve, &boundary).await;
        assert_eq!(report.verdict, Verdict::Pass, "{}", report.summary_line());
    }

    #[tokio::test]
    async fn test_long_question_rejected_for_unrelated_reason_fails() {
        let boundary = ScriptedBoundary::new()
            .with_login(granted(Role::Analyst))
            .with_submit(SubmitResponse::Rejected {
                status: Some(400),
                field: None,
                message: "Malformed JSON body".to_string(),
            });

        let report = run(Scenario::LongQuestion, &boundary).await;
        assert_eq!(report.verdict, Verdict::Fail);
        assert!(report.checks.iter().any(|c| !c.passed && c.name == "拒绝字段为 question"));
    }

    #[tokio::test]
    async fn test_long_question_rejected_by_field_passes() {
        let boundary = ScriptedBoundary::new()
            .with_login(granted(Role::Analyst))
            .with_submit(SubmitResponse::Rejected {
                status: Some(413),
                field: None,
                message: "Question too long".to_string(),
            });

        let report = run(Scenario::LongQuestion, &boundary).await;
        assert_eq!(report.verdict, Verdict::Pass, "{}", report.summary_line());
    }

    #[tokio::test]
    async fn test_upload_415_must_name_format() {
        let accepted = UploadOutcome::Accepted {
            processed_rows: 2,
            errors: Vec::new(),
        };
        // 脚本化上传只有一个响应，两次上传都返回它
        let boundary = ScriptedBoundary::new()
            .with_login(granted(Role::Admin))
            .with_upload(UploadOutcome::UnsupportedMediaType {
                message: "Internal server error".to_string(),
            });
        let report = run(Scenario::AdminUploadFormats, &boundary).await;
        assert_eq!(report.verdict, Verdict::Fail);
        assert!(report
            .checks
            .iter()
            .any(|c| !c.passed && c.name == "415 消息指出文件格式"));

        let boundary = ScriptedBoundary::new()
            .with_login(granted(Role::Admin))
            .with_upload(accepted);
        let report = run(Scenario::AdminUploadFormats, &boundary).await;
        assert_eq!(report.verdict, Verdict::Fail);
        assert!(report.checks.iter().any(|c| !c.passed && c.name == "非 CSV 返回 415"));
    }

    #[tokio::test]
    async fn test_recent_answers_checks_each_item() {
        let mut complete = answer(Some("q"), Some("Nokia"));
        complete.timestamp = Some(crate::models::job::parse_iso_timestamp("2024-05-01T10:20:30Z").unwrap());
        let boundary = ScriptedBoundary::new()
            .with_login(granted(Role::Analyst))
            .with_recent(vec![complete.clone(), answer(Some("q"), None)]);

        let report = run(Scenario::RecentAnswers, &boundary).await;
        assert_eq!(report.verdict, Verdict::Fail);
        assert_eq!(report.checks.iter().filter(|c| !c.passed).count(), 1);

        let boundary = ScriptedBoundary::new()
            .with_login(granted(Role::Analyst))
            .with_recent(vec![complete; 11]);
        let report = run(Scenario::RecentAnswers, &boundary).await;
        assert_eq!(report.verdict, Verdict::Fail);
        assert!(!report.checks[0].passed);
    }

    #[tokio::test]
    async fn test_malformed_json_expects_400() {
        let boundary = ScriptedBoundary::new()
            .with_login(granted(Role::Analyst))
            .with_submit(SubmitResponse::Rejected {
                status: Some(400),
                field: None,
                message: "Unexpected token i in JSON".to_string(),
            });
        let report = run(Scenario::MalformedJson, &boundary).await;
        assert_eq!(report.verdict, Verdict::Pass, "{}", report.summary_line());

        let boundary = ScriptedBoundary::new()
            .with_login(granted(Role::Analyst))
            .with_submit(queued());
        let report = run(Scenario::MalformedJson, &boundary).await;
        assert_eq!(report.verdict, Verdict::Fail);
    }

    #[tokio::test]
    async fn test_login_response_shape() {
        let boundary = ScriptedBoundary::new().with_login(granted(Role::Analyst));
        let report = run(Scenario::LoginResponseShape, &boundary).await;
        assert_eq!(report.verdict, Verdict::Pass, "{}", report.summary_line());

        let boundary = ScriptedBoundary::new().with_login(LoginResponse::Granted {
            token: CapabilityToken::Bearer("analyst-token".to_string()),
            role: Some(Role::Analyst),
            profile: LoginProfile::default(),
        });
        let report = run(Scenario::LoginResponseShape, &boundary).await;
        assert_eq!(report.verdict, Verdict::Fail);
        assert_eq!(report.checks.iter().filter(|c| !c.passed).count(), 3);
    }

    #[tokio::test]
    async fn test_api_only_scenarios_skipped_on_ui() {
        for scenario in [
            Scenario::RecentAnswers,
            Scenario::MalformedJson,
            Scenario::LoginResponseShape,
        ] {
            let boundary = ScriptedBoundary::new().with_kind(BoundaryKind::Ui);
            let report = run(scenario, &boundary).await;
            assert_eq!(report.verdict, Verdict::Skipped, "{}", scenario);
        }
    }
}
