//! 断言累加器与场景报告

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::BoundaryKind;
use crate::models::job::{format_history, is_canonical_uuid};
use crate::models::{AccessDecision, AccessOutcome, JobHandle, JobResult, JobState, Observation};

/// 单条断言记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckRecord {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

/// 断言累加器
///
/// 失败不中断场景，全部记录后统一给出判定
#[derive(Debug, Default)]
pub struct Checks {
    records: Vec<CheckRecord>,
}

impl Checks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一条断言，返回是否通过
    pub fn check(&mut self, name: impl Into<String>, passed: bool, detail: impl Into<String>) -> bool {
        let record = CheckRecord {
            name: name.into(),
            passed,
            detail: detail.into(),
        };
        if passed {
            debug!("  ✓ {}", record.name);
        } else {
            warn!("  ✗ {}: {}", record.name, record.detail);
        }
        self.records.push(record);
        passed
    }

    pub fn uuid(&mut self, name: &str, raw: &str) -> bool {
        self.check(name, is_canonical_uuid(raw), format!("{:?} 不是规范 UUID", raw))
    }

    /// 实际状态是否属于期望集合
    pub fn state_is(&mut self, name: &str, actual: JobState, expected: &[JobState]) -> bool {
        self.check(
            name,
            expected.contains(&actual),
            format!("状态为 {}，期望 {:?}", actual, expected),
        )
    }

    /// 消息（忽略大小写）包含任一关键字
    pub fn message_contains(&mut self, name: &str, message: &str, needles: &[&str]) -> bool {
        let lower = message.to_lowercase();
        let passed = needles.iter().any(|n| lower.contains(&n.to_lowercase()));
        self.check(name, passed, format!("消息 {:?} 不包含 {:?}", message, needles))
    }

    pub fn access_is(&mut self, decision: &AccessDecision, expected: AccessOutcome) -> bool {
        self.check(
            format!("{} 访问 {} 为 {:?}", decision.role, decision.resource, expected),
            decision.outcome == expected,
            decision.to_string(),
        )
    }

    pub fn confidence_in_range(&mut self, result: &JobResult) -> bool {
        self.check(
            "confidence 在 [0, 1]",
            (0.0..=1.0).contains(&result.confidence),
            format!("confidence = {}", result.confidence),
        )
    }

    pub fn all_passed(&self) -> bool {
        self.records.iter().all(|r| r.passed)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckRecord> {
        self.records.iter().filter(|r| !r.passed)
    }

    pub fn into_records(self) -> Vec<CheckRecord> {
        self.records
    }
}

/// 场景判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Pass,
    Fail,
    Skipped,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Skipped => "SKIP",
        };
        f.write_str(text)
    }
}

/// 单个场景的报告
///
/// 失败时保留最后已知的任务句柄和访问判定，不需要重跑就能定位问题
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub scenario: String,
    pub boundary: BoundaryKind,
    pub verdict: Verdict,
    pub duration: Duration,
    pub checks: Vec<CheckRecord>,
    pub error: Option<String>,
    pub skip_reason: Option<String>,
    pub last_job: Option<JobHandle>,
    pub last_access: Option<AccessDecision>,
    pub history: Vec<Observation>,
}

impl ScenarioReport {
    /// 场景还没开始（例如边界创建失败）就结束的报告
    pub fn setup_failed(scenario: impl Into<String>, boundary: BoundaryKind, error: String) -> Self {
        Self {
            scenario: scenario.into(),
            boundary,
            verdict: Verdict::Fail,
            duration: Duration::ZERO,
            checks: Vec::new(),
            error: Some(error),
            skip_reason: None,
            last_job: None,
            last_access: None,
            history: Vec::new(),
        }
    }

    /// 一行摘要，写入运行日志
    pub fn summary_line(&self) -> String {
        let mut line = format!(
            "[{}] {} ({:?}, {}ms, 断言 {}/{})",
            self.verdict,
            self.scenario,
            self.boundary,
            self.duration.as_millis(),
            self.checks.iter().filter(|c| c.passed).count(),
            self.checks.len()
        );
        if let Some(reason) = &self.skip_reason {
            line.push_str(&format!(" | 跳过: {}", reason));
        }
        for failure in self.checks.iter().filter(|c| !c.passed) {
            line.push_str(&format!(" | ✗ {}: {}", failure.name, failure.detail));
        }
        if let Some(error) = &self.error {
            line.push_str(&format!(" | 错误: {}", error));
        }
        if let Some(job) = &self.last_job {
            line.push_str(&format!(" | 最后任务 {}", job));
        }
        if let Some(access) = &self.last_access {
            line.push_str(&format!(" | 最后访问判定 {}", access));
        }
        if !self.history.is_empty() {
            line.push_str(&format!(" | 观测 [{}]", format_history(&self.history)));
        }
        line
    }
}
