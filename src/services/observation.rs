//! 任务观测引擎 - 业务能力层
//!
//! 分两层：
//! - [`ObservationMachine`] 是纯状态机，只接收"第 n 次看到了什么状态"，负责单调性判断
//! - [`ObservationEngine`] 负责轮询节奏、超时预算和结果校验，时间全部来自注入的 [`Clock`]

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::boundary::QaBoundary;
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{HarnessError, HarnessResult};
use crate::models::{Actor, JobHandle, JobId, JobResult, JobState, Observation, StatusSnapshot};

/// 轮询策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
    /// 进入终态后额外轮询的次数，用于主动发现状态倒退
    pub confirm_polls: u32,
}

impl PollPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.poll_interval(),
            timeout: config.poll_timeout(),
            confirm_polls: config.confirm_terminal_polls,
        }
    }
}

/// 一次观测之后状态机的去向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Terminal(JobState),
}

/// 单个任务的观测状态机
#[derive(Debug, Clone)]
pub struct ObservationMachine {
    job_id: JobId,
    current: JobState,
    history: Vec<Observation>,
}

impl ObservationMachine {
    pub fn new(handle: &JobHandle) -> Self {
        Self {
            job_id: handle.id().clone(),
            current: handle.state(),
            history: Vec::new(),
        }
    }

    /// 记录一次观测
    ///
    /// 状态倒退（包括终态之后出现其他状态）返回 `NonMonotonicState`
    pub fn observe(&mut self, state: JobState, elapsed: Duration) -> HarnessResult<Step> {
        let seq = self.history.len() as u32 + 1;
        self.history.push(Observation {
            seq,
            state,
            elapsed,
        });

        if !self.current.may_advance_to(state) {
            return Err(HarnessError::NonMonotonicState {
                job_id: self.job_id.clone(),
                previous: self.current,
                observed: state,
                history: self.history.clone(),
            });
        }

        self.current = state;
        if state.is_terminal() {
            Ok(Step::Terminal(state))
        } else {
            Ok(Step::Continue)
        }
    }

    pub fn current(&self) -> JobState {
        self.current
    }

    pub fn history(&self) -> &[Observation] {
        &self.history
    }

    pub fn timeout_error(&self, budget: Duration) -> HarnessError {
        HarnessError::ObservationTimeout {
            job_id: self.job_id.clone(),
            last_state: self.current,
            budget,
            history: self.history.clone(),
        }
    }

    pub fn into_history(self) -> Vec<Observation> {
        self.history
    }
}

/// 观测结果
#[derive(Debug, Clone)]
pub struct ObservationOutcome {
    pub final_state: JobState,
    /// 仅 Done 时存在，且已通过校验
    pub result: Option<JobResult>,
    /// 终态快照附带的边界消息
    pub message: Option<String>,
    pub history: Vec<Observation>,
    pub elapsed: Duration,
}

/// 观测引擎
///
/// 职责：
/// - 独占 JobHandle 的状态更新
/// - 按固定间隔轮询直到终态或超时
/// - 超时和状态倒退都直接失败，不重试
pub struct ObservationEngine {
    clock: Arc<dyn Clock>,
    policy: PollPolicy,
}

impl ObservationEngine {
    pub fn new(clock: Arc<dyn Clock>, policy: PollPolicy) -> Self {
        Self { clock, policy }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    fn since(&self, start: Duration) -> Duration {
        self.clock.elapsed().saturating_sub(start)
    }

    /// 观测任务直到终态
    ///
    /// # 参数
    /// - `boundary`: 当前场景的边界
    /// - `actor`: 轮询使用的身份
    /// - `handle`: 任务句柄，观测过程中只由本方法更新状态
    ///
    /// # 返回
    /// 终态、校验过的结果和完整观测历史；超时返回 `ObservationTimeout`，
    /// 状态倒退返回 `NonMonotonicState`
    pub async fn observe<B>(
        &self,
        boundary: &B,
        actor: &Actor,
        handle: &mut JobHandle,
    ) -> HarnessResult<ObservationOutcome>
    where
        B: QaBoundary + ?Sized,
    {
        let start = self.clock.elapsed();
        let mut machine = ObservationMachine::new(handle);
        info!(
            "⏳ 开始观测任务 {} (间隔 {}ms, 预算 {}ms)",
            handle.id(),
            self.policy.interval.as_millis(),
            self.policy.timeout.as_millis()
        );

        let mut terminal = loop {
            let snapshot = boundary.poll_status(actor, handle.id()).await?;
            let elapsed = self.since(start);
            let step = machine.observe(snapshot.state, elapsed)?;
            handle.record(snapshot.state);
            debug!("任务 {} #{} = {}", handle.id(), machine.history().len(), snapshot.state);

            if let Step::Terminal(_) = step {
                break snapshot;
            }
            if elapsed >= self.policy.timeout {
                warn!("⏰ 任务 {} 在 {}ms 内未完成", handle.id(), self.policy.timeout.as_millis());
                return Err(machine.timeout_error(self.policy.timeout));
            }

            let remaining = self.policy.timeout - elapsed;
            self.clock.sleep(self.policy.interval.min(remaining)).await;
        };

        for _ in 0..self.policy.confirm_polls {
            self.clock.sleep(self.policy.interval).await;
            let snapshot = boundary.poll_status(actor, handle.id()).await?;
            machine.observe(snapshot.state, self.since(start))?;
            if snapshot.result.is_some() || terminal.result.is_none() {
                terminal = snapshot;
            }
        }

        let final_state = machine.current();
        let result = match final_state {
            JobState::Done => Some(
                self.fetch_result(boundary, actor, &mut machine, start, handle.id())
                    .await?,
            ),
            _ => {
                if terminal.result.is_some() {
                    warn!("⚠️ 任务 {} 状态为 {} 却带有结果，忽略", handle.id(), final_state);
                }
                None
            }
        };

        let elapsed = self.since(start);
        info!(
            "✓ 任务 {} 进入终态 {} (轮询 {} 次, 耗时 {}ms)",
            handle.id(),
            final_state,
            machine.history().len(),
            elapsed.as_millis()
        );

        Ok(ObservationOutcome {
            final_state,
            result,
            message: terminal.message,
            history: machine.into_history(),
            elapsed,
        })
    }

    /// 读取结果；结果快照本身也是一次观测，同样参与单调性检查
    async fn fetch_result<B>(
        &self,
        boundary: &B,
        actor: &Actor,
        machine: &mut ObservationMachine,
        start: Duration,
        job_id: &JobId,
    ) -> HarnessResult<JobResult>
    where
        B: QaBoundary + ?Sized,
    {
        let StatusSnapshot { state, result, .. } = boundary.fetch_result(actor, job_id).await?;
        machine.observe(state, self.since(start))?;

        let result = result.ok_or_else(|| HarnessError::InvalidResult {
            job_id: job_id.clone(),
            reason: "状态为 done 但没有结果".to_string(),
        })?;
        result.validate(job_id)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::scripted::ScriptedBoundary;
    use crate::clock::ManualClock;
    use crate::models::{CapabilityToken, Role};
    use chrono::Utc;
    use proptest::prelude::*;

    const JOB_ID: &str = "3f2b8c1e-9a4d-4e7f-8b21-0c6d5e4f3a2b";

    fn handle() -> JobHandle {
        JobHandle::queued(JobId::parse(JOB_ID).unwrap(), Utc::now())
    }

    fn actor() -> Actor {
        Actor::forged(Role::Analyst, CapabilityToken::Bearer("t".to_string()))
    }

    fn policy(confirm_polls: u32) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
            confirm_polls,
        }
    }

    fn done_snapshot(answer: &str, confidence: f64) -> StatusSnapshot {
        StatusSnapshot {
            state: JobState::Done,
            result: Some(JobResult {
                answer: answer.to_string(),
                confidence,
                question: None,
                company: None,
                timestamp: None,
            }),
            message: None,
        }
    }

    fn engine(clock: &ManualClock, confirm_polls: u32) -> ObservationEngine {
        ObservationEngine::new(Arc::new(clock.clone()), policy(confirm_polls))
    }

    #[tokio::test]
    async fn test_reaches_done_and_validates_result() {
        let clock = ManualClock::new();
        let boundary = ScriptedBoundary::new()
            .with_states(&[JobState::Queued, JobState::Processing, JobState::Processing])
            .with_snapshot(done_snapshot("12,300 tCO2e", 0.82));
        let mut handle = handle();

        let outcome = engine(&clock, 0)
            .observe(&boundary, &actor(), &mut handle)
            .await
            .unwrap();

        assert_eq!(outcome.final_state, JobState::Done);
        assert_eq!(handle.state(), JobState::Done);
        assert_eq!(outcome.result.unwrap().confidence, 0.82);
        // 4 次轮询 + 1 次读取结果
        assert_eq!(outcome.history.len(), 5);
        assert_eq!(outcome.elapsed, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_fast_path_queued_to_failed() {
        let clock = ManualClock::new();
        let boundary = ScriptedBoundary::new().with_snapshot(StatusSnapshot {
            state: JobState::Failed,
            result: None,
            message: Some("AIML service unavailable".to_string()),
        });

        let outcome = engine(&clock, 0)
            .observe(&boundary, &actor(), &mut handle())
            .await
            .unwrap();

        assert_eq!(outcome.final_state, JobState::Failed);
        assert!(outcome.result.is_none());
        assert_eq!(outcome.message.as_deref(), Some("AIML service unavailable"));
    }

    #[tokio::test]
    async fn test_timeout_carries_last_state() {
        let clock = ManualClock::new();
        let boundary = ScriptedBoundary::new().with_states(&[JobState::Queued, JobState::Processing]);

        let err = engine(&clock, 0)
            .observe(&boundary, &actor(), &mut handle())
            .await
            .unwrap_err();

        match err {
            HarnessError::ObservationTimeout {
                last_state,
                budget,
                history,
                ..
            } => {
                assert_eq!(last_state, JobState::Processing);
                assert_eq!(budget, Duration::from_secs(30));
                assert_eq!(history.len(), 31);
            }
            other => panic!("期望超时错误, 实际: {}", other),
        }
        assert_eq!(clock.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_regression_is_non_monotonic() {
        let clock = ManualClock::new();
        let boundary = ScriptedBoundary::new().with_states(&[
            JobState::Processing,
            JobState::Queued,
        ]);

        let err = engine(&clock, 0)
            .observe(&boundary, &actor(), &mut handle())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            HarnessError::NonMonotonicState {
                previous: JobState::Processing,
                observed: JobState::Queued,
                ..
            }
        ));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_confirm_poll_detects_terminal_reversion() {
        let clock = ManualClock::new();
        let boundary = ScriptedBoundary::new()
            .with_snapshot(done_snapshot("answer", 0.5))
            .with_states(&[JobState::Processing]);

        let err = engine(&clock, 1)
            .observe(&boundary, &actor(), &mut handle())
            .await
            .unwrap_err();

        assert_eq!(err.last_known_state(), Some(JobState::Processing));
        assert!(matches!(err, HarnessError::NonMonotonicState { previous: JobState::Done, .. }));
    }

    #[tokio::test]
    async fn test_result_fetch_that_reverts_is_non_monotonic() {
        let clock = ManualClock::new();
        let boundary = ScriptedBoundary::new()
            .with_snapshot(done_snapshot("answer", 0.5))
            .with_result(StatusSnapshot::bare(JobState::Processing));

        let err = engine(&clock, 0)
            .observe(&boundary, &actor(), &mut handle())
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::NonMonotonicState { .. }));
    }

    #[tokio::test]
    async fn test_done_with_out_of_range_confidence_is_invalid() {
        let clock = ManualClock::new();
        let boundary = ScriptedBoundary::new().with_snapshot(done_snapshot("answer", 1.7));

        let err = engine(&clock, 0)
            .observe(&boundary, &actor(), &mut handle())
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::InvalidResult { .. }));
    }

    #[tokio::test]
    async fn test_done_with_empty_answer_is_invalid() {
        let clock = ManualClock::new();
        let boundary = ScriptedBoundary::new().with_snapshot(done_snapshot("   ", 0.4));

        let err = engine(&clock, 0)
            .observe(&boundary, &actor(), &mut handle())
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::InvalidResult { .. }));
    }

    #[tokio::test]
    async fn test_done_without_result_is_invalid() {
        let clock = ManualClock::new();
        let boundary = ScriptedBoundary::new().with_states(&[JobState::Done]);

        let err = engine(&clock, 0)
            .observe(&boundary, &actor(), &mut handle())
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::InvalidResult { .. }));
    }

    #[tokio::test]
    async fn test_poll_error_propagates_without_retry() {
        let clock = ManualClock::new();
        let boundary = ScriptedBoundary::new()
            .with_states(&[JobState::Queued])
            .with_poll_error(HarnessError::JobNotFound {
                job_id: JOB_ID.to_string(),
            });

        let err = engine(&clock, 0)
            .observe(&boundary, &actor(), &mut handle())
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::JobNotFound { .. }));
        assert_eq!(boundary.poll_count(), 2);
    }

    fn any_state() -> impl Strategy<Value = JobState> {
        prop_oneof![
            Just(JobState::Queued),
            Just(JobState::Processing),
            Just(JobState::Done),
            Just(JobState::Failed),
        ]
    }

    proptest! {
        #[test]
        fn prop_machine_accepts_exactly_non_decreasing_sequences(
            states in proptest::collection::vec(any_state(), 1..12)
        ) {
            let mut machine = ObservationMachine::new(&handle());
            let mut previous = JobState::Queued;
            let mut terminal_seen = false;

            for (i, state) in states.iter().enumerate() {
                let expected_ok = if terminal_seen {
                    *state == previous
                } else {
                    state.rank() >= previous.rank()
                };
                let step = machine.observe(*state, Duration::from_millis(i as u64));
                prop_assert_eq!(step.is_ok(), expected_ok);
                if !expected_ok {
                    break;
                }
                previous = *state;
                terminal_seen = state.is_terminal();
            }
        }

        #[test]
        fn prop_accepted_history_never_leaves_terminal_state(
            states in proptest::collection::vec(any_state(), 1..12)
        ) {
            let mut machine = ObservationMachine::new(&handle());
            let mut rejected = false;
            for (i, state) in states.iter().enumerate() {
                if machine.observe(*state, Duration::from_millis(i as u64)).is_err() {
                    rejected = true;
                    break;
                }
            }

            let history = machine.history();
            let accepted = if rejected { &history[..history.len() - 1] } else { history };
            for pair in accepted.windows(2) {
                prop_assert!(pair[0].state.rank() <= pair[1].state.rank());
                if pair[0].state.is_terminal() {
                    prop_assert_eq!(pair[0].state, pair[1].state);
                }
            }
            let last = accepted.last().map(|o| o.state).unwrap_or(JobState::Queued);
            prop_assert_eq!(machine.current(), last);
        }
    }
}
