//! 任务模型
//!
//! JobId / JobState / JobHandle / JobResult 以及轮询观测记录

use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

/// 规范 UUID 格式：8-4-4-4-12 十六进制，带连字符
fn uuid_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
            .expect("UUID 正则表达式无效")
    })
}

/// 检查字符串是否为规范 UUID（只做结构检查，不检查是否存在）
pub fn is_canonical_uuid(raw: &str) -> bool {
    uuid_pattern().is_match(raw)
}

/// 解析 ISO-8601 时间戳
///
/// 接受带时区的 RFC 3339 格式，以及不带时区的 `YYYY-MM-DDTHH:MM:SS[.fff]`（按 UTC 处理）
pub fn parse_iso_timestamp(raw: &str) -> HarnessResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| HarnessError::protocol("timestamp", format!("不是 ISO-8601 时间戳: {}", raw)))
}

/// 任务标识
///
/// 只能通过 [`JobId::parse`] 构造，保证格式合法
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// 校验并创建任务 ID
    pub fn parse(raw: &str) -> HarnessResult<Self> {
        if is_canonical_uuid(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(HarnessError::protocol(
                "jobId",
                format!("任务 ID 不是规范 UUID: {:?}", raw),
            ))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 任务状态
///
/// Queued < Processing < {Done | Failed}，后两者为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Processing,
    Done,
    Failed,
}

impl JobState {
    /// 解析边界返回的状态词
    ///
    /// `running` 是 `processing` 的别名
    pub fn parse(raw: &str) -> HarnessResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" => Ok(Self::Queued),
            "processing" | "running" => Ok(Self::Processing),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            other => Err(HarnessError::protocol(
                "status",
                format!("未知的任务状态: {:?}", other),
            )),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// 状态序号，Done 和 Failed 同级
    pub fn rank(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Processing => 1,
            Self::Done | Self::Failed => 2,
        }
    }

    /// `self -> next` 是否为合法迁移（包括停留在原状态）
    ///
    /// 终态之后只允许停留在同一个终态
    pub fn may_advance_to(self, next: JobState) -> bool {
        if self.is_terminal() {
            return self == next;
        }
        next.rank() >= self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 已提交任务的句柄
///
/// `state` 只允许观测引擎通过 [`JobHandle::record`] 修改
#[derive(Debug, Clone, Serialize)]
pub struct JobHandle {
    id: JobId,
    submitted_at: DateTime<Utc>,
    state: JobState,
}

impl JobHandle {
    /// 新提交的任务一律处于 Queued
    pub fn queued(id: JobId, submitted_at: DateTime<Utc>) -> Self {
        Self {
            id,
            submitted_at,
            state: JobState::Queued,
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub(crate) fn record(&mut self, state: JobState) {
        self.state = state;
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[任务 {} 状态 {}]", self.id, self.state)
    }
}

/// 完成任务的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResult {
    pub answer: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl JobResult {
    /// 校验结果不变量：答案非空，置信度在 [0, 1]
    pub fn validate(&self, job_id: &JobId) -> HarnessResult<()> {
        if self.answer.trim().is_empty() {
            return Err(HarnessError::InvalidResult {
                job_id: job_id.clone(),
                reason: "answer 为空".to_string(),
            });
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(HarnessError::InvalidResult {
                job_id: job_id.clone(),
                reason: format!("confidence {} 不在 [0, 1] 范围内", self.confidence),
            });
        }
        Ok(())
    }
}

/// 一次轮询看到的任务快照
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub state: JobState,
    pub result: Option<JobResult>,
    /// 失败任务附带的边界消息
    pub message: Option<String>,
}

impl StatusSnapshot {
    pub fn bare(state: JobState) -> Self {
        Self {
            state,
            result: None,
            message: None,
        }
    }
}

/// 观测记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// 从 1 开始的轮询序号
    pub seq: u32,
    pub state: JobState,
    /// 距离观测开始的时间
    pub elapsed: Duration,
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}ms={}", self.seq, self.elapsed.as_millis(), self.state)
    }
}

/// 把观测历史格式化成一行，用于错误诊断
pub fn format_history(history: &[Observation]) -> String {
    history
        .iter()
        .map(|o| o.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}
