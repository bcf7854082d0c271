use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{HarnessError, HarnessResult};
use crate::models::{Credential, QuestionPayload, Role};

/// 使用哪个边界执行场景
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryKind {
    Api,
    Ui,
}

impl BoundaryKind {
    pub fn from_str(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "api" => Some(Self::Api),
            "ui" => Some(Self::Ui),
            _ => None,
        }
    }
}

/// 示例数据
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SampleData {
    pub valid_question: String,
    pub valid_company: String,
    pub unicode_question: String,
    pub unicode_company: String,
    pub special_question: String,
}

impl Default for SampleData {
    fn default() -> Self {
        Self {
            valid_question: "What are the Scope 1 emissions for this company?".to_string(),
            valid_company: "Nokia".to_string(),
            unicode_question: "What are 中国公司's sustainability practices?".to_string(),
            unicode_company: "中国移动".to_string(),
            special_question: "What's the company's CO₂ emissions & ESG score? 🌍".to_string(),
        }
    }
}

impl SampleData {
    pub fn valid_payload(&self) -> QuestionPayload {
        QuestionPayload::new(&self.valid_question, &self.valid_company)
    }
}

/// UI 路由
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Routes {
    pub login: String,
    pub dashboard: String,
    pub upload: String,
    /// 明确的拒绝页，访问判定以此识别 Denied
    pub denial: String,
}

impl Default for Routes {
    fn default() -> Self {
        Self {
            login: "/login".to_string(),
            dashboard: "/dashboard".to_string(),
            upload: "/admin/upload".to_string(),
            denial: "/403".to_string(),
        }
    }
}

/// 测试运行配置
///
/// 不可变，在场景创建时显式传入
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub ui_base_url: String,
    pub boundary: BoundaryKind,
    /// 浏览器调试端口（连接已运行的浏览器）
    pub browser_debug_port: u16,
    /// 设置后启动无头浏览器，而不是连接调试端口
    pub browser_executable: Option<String>,
    pub analyst: Credential,
    pub admin: Credential,
    pub sample: SampleData,
    pub routes: Routes,
    /// 轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 单个任务的观测预算（毫秒）
    pub poll_timeout_ms: u64,
    /// 进入终态后的确认轮询次数
    pub confirm_terminal_polls: u32,
    /// 单个场景的总预算（毫秒）
    pub scenario_timeout_ms: u64,
    /// 单个 HTTP 请求超时（毫秒）
    pub request_timeout_ms: u64,
    /// 传输错误的最大重试次数
    pub transport_retries: u32,
    pub transport_retry_delay_ms: u64,
    /// 问题长度上限（字符数），超过必须被拒绝
    pub max_question_chars: usize,
    /// 同时运行的场景数量
    pub max_concurrent_scenarios: usize,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3001".to_string(),
            ui_base_url: "http://localhost:3000".to_string(),
            boundary: BoundaryKind::Api,
            browser_debug_port: 9222,
            browser_executable: None,
            analyst: Credential::new(Role::Analyst, "analyst@test.com", "TestPass123!"),
            admin: Credential::new(Role::Admin, "admin@test.com", "AdminPass123!"),
            sample: SampleData::default(),
            routes: Routes::default(),
            poll_interval_ms: 1000,
            poll_timeout_ms: 30_000,
            confirm_terminal_polls: 1,
            scenario_timeout_ms: 60_000,
            request_timeout_ms: 5_000,
            transport_retries: 3,
            transport_retry_delay_ms: 500,
            max_question_chars: 10_000,
            max_concurrent_scenarios: 4,
            verbose_logging: false,
            output_log_file: "qa_job_verify.log".to_string(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            api_base_url: std::env::var("QA_API_BASE_URL").unwrap_or(default.api_base_url),
            ui_base_url: std::env::var("QA_UI_BASE_URL").unwrap_or(default.ui_base_url),
            boundary: std::env::var("QA_BOUNDARY").ok().and_then(|v| BoundaryKind::from_str(&v)).unwrap_or(default.boundary),
            browser_debug_port: env_parse("QA_BROWSER_DEBUG_PORT").unwrap_or(default.browser_debug_port),
            browser_executable: std::env::var("QA_BROWSER_EXECUTABLE").ok().or(default.browser_executable),
            analyst: Credential::new(
                Role::Analyst,
                std::env::var("QA_ANALYST_EMAIL").unwrap_or(default.analyst.email),
                std::env::var("QA_ANALYST_PASSWORD").unwrap_or(default.analyst.password),
            ),
            admin: Credential::new(
                Role::Admin,
                std::env::var("QA_ADMIN_EMAIL").unwrap_or(default.admin.email),
                std::env::var("QA_ADMIN_PASSWORD").unwrap_or(default.admin.password),
            ),
            sample: default.sample,
            routes: default.routes,
            poll_interval_ms: env_parse("QA_POLL_INTERVAL_MS").unwrap_or(default.poll_interval_ms),
            poll_timeout_ms: env_parse("QA_POLL_TIMEOUT_MS").unwrap_or(default.poll_timeout_ms),
            confirm_terminal_polls: env_parse("QA_CONFIRM_TERMINAL_POLLS").unwrap_or(default.confirm_terminal_polls),
            scenario_timeout_ms: env_parse("QA_SCENARIO_TIMEOUT_MS").unwrap_or(default.scenario_timeout_ms),
            request_timeout_ms: env_parse("QA_REQUEST_TIMEOUT_MS").unwrap_or(default.request_timeout_ms),
            transport_retries: env_parse("QA_TRANSPORT_RETRIES").unwrap_or(default.transport_retries),
            transport_retry_delay_ms: env_parse("QA_TRANSPORT_RETRY_DELAY_MS").unwrap_or(default.transport_retry_delay_ms),
            max_question_chars: env_parse("QA_MAX_QUESTION_CHARS").unwrap_or(default.max_question_chars),
            max_concurrent_scenarios: env_parse("QA_MAX_CONCURRENT_SCENARIOS").unwrap_or(default.max_concurrent_scenarios),
            verbose_logging: env_parse("QA_VERBOSE_LOGGING").unwrap_or(default.verbose_logging),
            output_log_file: std::env::var("QA_OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
        }
    }

    /// 从 TOML 文件加载，未给出的字段使用默认值
    pub fn from_toml_file(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> HarnessResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| HarnessError::Config(format!("无法解析 TOML 配置: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 检查各个时间预算之间的关系
    pub fn validate(&self) -> HarnessResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(HarnessError::Config("poll_interval_ms 不能为 0".to_string()));
        }
        if self.poll_interval_ms > self.poll_timeout_ms {
            return Err(HarnessError::Config(format!(
                "poll_interval_ms ({}) 不能大于 poll_timeout_ms ({})",
                self.poll_interval_ms, self.poll_timeout_ms
            )));
        }
        if self.poll_timeout_ms > self.scenario_timeout_ms {
            return Err(HarnessError::Config(format!(
                "poll_timeout_ms ({}) 不能大于 scenario_timeout_ms ({})",
                self.poll_timeout_ms, self.scenario_timeout_ms
            )));
        }
        if self.max_concurrent_scenarios == 0 {
            return Err(HarnessError::Config("max_concurrent_scenarios 不能为 0".to_string()));
        }
        if self.analyst.role != Role::Analyst || self.admin.role != Role::Admin {
            return Err(HarnessError::Config("analyst/admin 凭据的角色配置错误".to_string()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn scenario_timeout(&self) -> Duration {
        Duration::from_millis(self.scenario_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn transport_retry_delay(&self) -> Duration {
        Duration::from_millis(self.transport_retry_delay_ms)
    }

    pub fn credential_for(&self, role: Role) -> &Credential {
        match role {
            Role::Analyst => &self.analyst,
            Role::Admin => &self.admin,
        }
    }
}
