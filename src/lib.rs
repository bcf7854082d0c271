//! # QA Job Verify
//!
//! 端到端验证 ESG 问答服务的异步任务生命周期
//!
//! ## 架构设计
//!
//! 本系统采用严格的分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `JsExecutor` - 唯一的 page owner，提供 eval() 能力
//!
//! ### ② 边界层（Boundary）
//! - `boundary/` - 同一套能力契约 `QaBoundary`，两种实现
//! - `ApiBoundary` - 直接调用 HTTP 接口
//! - `UiBoundary` - 通过浏览器页面驱动
//!
//! ### ③ 业务能力层（Services）
//! - `SessionManager` - 登录、登出、持有令牌
//! - `JobGateway` - 提交问题并解释受理/拒绝
//! - `ObservationEngine` - 轮询任务状态直到终态
//! - `AccessVerifier` - 判定受保护资源是否可访问
//!
//! ### ④ 场景层（Scenarios）
//! - `scenarios/` - 定义"一个场景"的完整步骤
//! - `ScenarioCtx` - 上下文封装（场景名 + 边界 + 断言）
//!
//! ### ⑤ 编排层（Orchestration）
//! - `orchestrator/runner` - 并发运行场景，汇总判定
//!
//! ## 模块结构

pub mod boundary;
pub mod browser;
pub mod clock;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod selectors;

pub mod models;
pub mod orchestrator;
pub mod report;
pub mod scenarios;
pub mod services;
pub mod utils;

// 重新导出常用类型
pub use boundary::{Boundary, BoundaryFactory, QaBoundary};
pub use clock::{Clock, ManualClock, TokioClock};
pub use config::{BoundaryKind, Config};
pub use error::{HarnessError, HarnessResult};
pub use infrastructure::JsExecutor;
pub use orchestrator::{App, RunSummary, ScenarioRunner};
pub use report::{ScenarioReport, Verdict};
pub use scenarios::{catalogue, run_scenario, Scenario};
