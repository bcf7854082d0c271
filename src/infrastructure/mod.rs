//! 基础设施层
//!
//! 只持有稀缺资源（Page），对上暴露能力

pub mod js_executor;

pub use js_executor::JsExecutor;
