//! 场景上下文
//!
//! 封装"我正在跑哪个场景、用哪个边界"这一信息，以及场景期间累积的状态

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use crate::boundary::QaBoundary;
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{HarnessError, HarnessResult};
use crate::models::{AccessDecision, JobHandle, Observation, Role};
use crate::report::{Checks, ScenarioReport, Verdict};
use crate::services::{AccessVerifier, JobGateway, ObservationEngine, PollPolicy, SessionManager};

/// 场景上下文
///
/// 每个场景独享一个，会话和令牌不跨场景共享
pub struct ScenarioCtx<'a> {
    /// 场景名（仅用于日志和报告）
    pub name: &'static str,
    pub config: &'a Config,
    pub boundary: &'a dyn QaBoundary,
    pub session: SessionManager,
    pub gateway: JobGateway,
    pub engine: ObservationEngine,
    pub access: AccessVerifier,
    pub checks: Checks,
    /// 最后一个任务句柄，状态由观测引擎更新
    pub last_job: Option<JobHandle>,
    pub last_access: Option<AccessDecision>,
    pub history: Vec<Observation>,
    pub skip_reason: Option<String>,
}

impl<'a> ScenarioCtx<'a> {
    /// 创建新的场景上下文
    pub fn new(
        name: &'static str,
        config: &'a Config,
        boundary: &'a dyn QaBoundary,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name,
            config,
            boundary,
            session: SessionManager::new(),
            gateway: JobGateway::new(config),
            engine: ObservationEngine::new(clock, PollPolicy::from_config(config)),
            access: AccessVerifier::new(config),
            checks: Checks::new(),
            last_job: None,
            last_access: None,
            history: Vec::new(),
            skip_reason: None,
        }
    }

    /// 以配置中该角色的账号登录
    pub async fn login_as(&mut self, role: Role) -> HarnessResult<()> {
        let credential = self.config.credential_for(role);
        self.session.authenticate(self.boundary, credential).await?;
        Ok(())
    }

    pub fn skip(&mut self, reason: impl Into<String>) {
        self.skip_reason = Some(reason.into());
    }

    /// 汇总为报告
    ///
    /// 有错误或任一断言失败即为 Fail；一条断言都没有也判为 Fail
    pub fn into_report(self, result: HarnessResult<()>, duration: Duration) -> ScenarioReport {
        let mut history = self.history;
        let error = match result {
            Ok(()) => None,
            Err(e) => {
                if let HarnessError::ObservationTimeout { history: h, .. }
                | HarnessError::NonMonotonicState { history: h, .. } = &e
                {
                    history = h.clone();
                }
                Some(e.to_string())
            }
        };

        let verdict = if error.is_some() {
            Verdict::Fail
        } else if self.skip_reason.is_some() {
            Verdict::Skipped
        } else if !self.checks.is_empty() && self.checks.all_passed() {
            Verdict::Pass
        } else {
            Verdict::Fail
        };

        ScenarioReport {
            scenario: self.name.to_string(),
            boundary: self.boundary.kind(),
            verdict,
            duration,
            checks: self.checks.into_records(),
            error,
            skip_reason: self.skip_reason,
            last_job: self.last_job,
            last_access: self.last_access,
            history,
        }
    }
}

impl Display for ScenarioCtx<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[场景 {} {:?}]", self.name, self.boundary.kind())
    }
}
