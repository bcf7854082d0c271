//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责场景调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `runner` - 场景运行器
//! - 管理应用生命周期（初始化、运行）
//! - 控制并发数量（Semaphore）
//! - 管理边界资源（BoundaryFactory，UI 模式下持有 Browser）
//! - 输出全局统计信息
//!
//! ## 层次关系
//!
//! ```text
//! runner (处理 Vec<Scenario>)
//!     ↓
//! scenarios::run_scenario (处理单个场景)
//!     ↓
//! services (能力层：session / gateway / observation / access)
//!     ↓
//! boundary (API 或 UI)
//!     ↓
//! infrastructure (基础设施：JsExecutor)
//! ```
//!
//! ## 设计原则
//!
//! 1. **资源隔离**：只有编排层持有 Browser，每个场景拿自己的边界
//! 2. **向下依赖**：编排层 → scenarios → services → boundary
//! 3. **无业务逻辑**：只做调度和统计，不做具体判断

pub mod runner;

pub use runner::{App, RunSummary, ScenarioRunner};
