//! 任务提交网关 - 业务能力层
//!
//! 只负责"提交一个问题并拿到任务句柄或校验拒绝"

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::boundary::{QaBoundary, SubmitResponse};
use crate::config::Config;
use crate::error::{HarnessError, HarnessResult};
use crate::models::job::parse_iso_timestamp;
use crate::models::{
    Actor, JobHandle, JobId, JobState, QuestionPayload, Submission, ValidationOutcome,
};
use crate::utils::logging::truncate_text;

/// 边界既没有给出字段、消息里也没点名时使用
pub const UNKNOWN_FIELD: &str = "unknown";

/// 从边界消息推断被拒绝的字段
fn field_from_message(message: &str) -> Option<&'static str> {
    let lower = message.to_lowercase();
    if lower.contains("question") {
        Some("question")
    } else if lower.contains("company") {
        Some("company")
    } else {
        None
    }
}

/// 任务提交网关
///
/// 校验拒绝由边界给出，网关不在本地拦截，也不编造消息
pub struct JobGateway {
    max_question_chars: usize,
}

impl JobGateway {
    pub fn new(config: &Config) -> Self {
        Self {
            max_question_chars: config.max_question_chars,
        }
    }

    /// 提交问题
    ///
    /// # 参数
    /// - `boundary`: 当前场景的边界
    /// - `actor`: 提交者
    /// - `payload`: 问题与公司
    ///
    /// # 返回
    /// `Accepted` 时任务 ID 已通过 UUID 格式校验，状态为 Queued；
    /// `Rejected` 时携带边界原样返回的消息
    pub async fn submit<B>(
        &self,
        boundary: &B,
        actor: &Actor,
        payload: &QuestionPayload,
    ) -> HarnessResult<Submission>
    where
        B: QaBoundary + ?Sized,
    {
        info!(
            "📤 {} 提交问题 ({} 字符): {}",
            actor,
            payload.question_chars(),
            truncate_text(&payload.question, 40)
        );

        match boundary.submit(actor, payload).await? {
            SubmitResponse::Accepted {
                job_id,
                status,
                submitted_at,
            } => {
                let handle = self.accept(&job_id, &status, submitted_at.as_deref())?;
                info!("✓ 任务已创建: {}", handle);
                if payload.question_chars() > self.max_question_chars {
                    warn!(
                        "⚠️ 问题长度 {} 超过上限 {} 却被受理",
                        payload.question_chars(),
                        self.max_question_chars
                    );
                }
                Ok(Submission::Accepted(handle))
            }
            SubmitResponse::Rejected {
                status,
                field,
                message,
            } => {
                // 字段只来自边界：结构化字段优先，其次是消息里点名的字段
                let field = field
                    .or_else(|| field_from_message(&message).map(str::to_string))
                    .unwrap_or_else(|| UNKNOWN_FIELD.to_string());
                let outcome = ValidationOutcome {
                    field,
                    rejected: true,
                    message,
                    status,
                };
                info!("✗ 提交被拒绝: {}", outcome);
                Ok(Submission::Rejected(outcome))
            }
        }
    }

    /// 校验受理响应并创建句柄
    fn accept(&self, raw_id: &str, status: &str, submitted_at: Option<&str>) -> HarnessResult<JobHandle> {
        let id = JobId::parse(raw_id)?;

        let state = JobState::parse(status)?;
        if state != JobState::Queued {
            return Err(HarnessError::protocol(
                "status",
                format!("新任务的初始状态应为 queued，实际为 {}", state),
            ));
        }

        let submitted_at = match submitted_at {
            Some(raw) => parse_iso_timestamp(raw)?,
            None => {
                debug!("响应中没有 submittedAt，使用本地时间");
                Utc::now()
            }
        };

        Ok(JobHandle::queued(id, submitted_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::scripted::ScriptedBoundary;
    use crate::models::{CapabilityToken, Role};

    const JOB_ID: &str = "3f2b8c1e-9a4d-4e7f-8b21-0c6d5e4f3a2b";

    fn actor() -> Actor {
        Actor::forged(Role::Analyst, CapabilityToken::Bearer("t".to_string()))
    }

    fn accepted(job_id: &str, status: &str, submitted_at: Option<&str>) -> SubmitResponse {
        SubmitResponse::Accepted {
            job_id: job_id.to_string(),
            status: status.to_string(),
            submitted_at: submitted_at.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_accepted_submission_is_queued() {
        let gateway = JobGateway::new(&Config::default());
        let boundary = ScriptedBoundary::new().with_submit(accepted(
            JOB_ID,
            "queued",
            Some("2024-05-01T10:20:30.123Z"),
        ));

        let submission = gateway
            .submit(&boundary, &actor(), &QuestionPayload::new("Scope 1?", "Nokia"))
            .await
            .unwrap();

        let handle = submission.handle().unwrap();
        assert_eq!(handle.id().as_str(), JOB_ID);
        assert_eq!(handle.state(), JobState::Queued);
    }

    #[tokio::test]
    async fn test_malformed_job_id_is_protocol_error() {
        let gateway = JobGateway::new(&Config::default());
        let boundary = ScriptedBoundary::new().with_submit(accepted("job-42", "queued", None));

        let err = gateway
            .submit(&boundary, &actor(), &QuestionPayload::new("Scope 1?", "Nokia"))
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Protocol { ref field, .. } if field == "jobId"));
    }

    #[tokio::test]
    async fn test_initial_status_must_be_queued() {
        let gateway = JobGateway::new(&Config::default());
        let boundary = ScriptedBoundary::new().with_submit(accepted(JOB_ID, "done", None));

        let err = gateway
            .submit(&boundary, &actor(), &QuestionPayload::new("Scope 1?", "Nokia"))
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Protocol { ref field, .. } if field == "status"));
    }

    #[tokio::test]
    async fn test_bad_submitted_at_is_rejected() {
        let gateway = JobGateway::new(&Config::default());
        let boundary =
            ScriptedBoundary::new().with_submit(accepted(JOB_ID, "queued", Some("yesterday")));

        let result = gateway
            .submit(&boundary, &actor(), &QuestionPayload::new("Scope 1?", "Nokia"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_rejection_keeps_boundary_message() {
        let gateway = JobGateway::new(&Config::default());
        let boundary = ScriptedBoundary::new().with_submit(SubmitResponse::Rejected {
            status: Some(400),
            field: None,
            message: "Question is required".to_string(),
        });

        let submission = gateway
            .submit(&boundary, &actor(), &QuestionPayload::new("", "Nokia"))
            .await
            .unwrap();

        let rejection = submission.rejection().unwrap();
        assert!(submission.handle().is_none());
        assert_eq!(rejection.field, "question");
        assert_eq!(rejection.message, "Question is required");
        assert!(rejection.rejected);
    }

    #[tokio::test]
    async fn test_rejection_without_field_stays_unknown() {
        let gateway = JobGateway::new(&Config::default());
        let boundary = ScriptedBoundary::new().with_submit(SubmitResponse::Rejected {
            status: Some(400),
            field: None,
            message: "Malformed JSON body".to_string(),
        });

        let submission = gateway
            .submit(
                &boundary,
                &actor(),
                &QuestionPayload::without_company("Scope 1?"),
            )
            .await
            .unwrap();
        let rejection = submission.rejection().unwrap();
        assert_eq!(rejection.field, UNKNOWN_FIELD);
        assert_eq!(rejection.message, "Malformed JSON body");
    }

    #[test]
    fn test_field_from_message() {
        assert_eq!(field_from_message("Question too long"), Some("question"));
        assert_eq!(field_from_message("Company is required"), Some("company"));
        assert_eq!(field_from_message("Unauthorized"), None);
    }
}
