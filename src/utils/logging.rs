/// 日志工具模块
///
/// 提供日志初始化和输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::orchestrator::RunSummary;

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// 初始化 tracing 订阅者
///
/// `RUST_LOG` 优先；否则 `verbose` 时为 `debug`，默认 `info`
pub fn init(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(if verbose { "debug" } else { "info" }))
        .with_target(false)
        .init();
}

/// 测试中使用，重复初始化时静默忽略
pub fn try_init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter("debug"))
        .with_test_writer()
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 任务生命周期验证");
    info!("🔌 边界: {:?}", config.boundary);
    info!("🌐 API: {} | UI: {}", config.api_base_url, config.ui_base_url);
    info!(
        "⏱️ 轮询间隔 {}ms / 观测预算 {}ms / 场景预算 {}ms",
        config.poll_interval_ms, config.poll_timeout_ms, config.scenario_timeout_ms
    );
    info!("📊 最大并发数: {}", config.max_concurrent_scenarios);
    info!("{}", "=".repeat(60));
}

/// 记录场景加载信息
///
/// # 参数
/// - `total`: 场景总数
/// - `max_concurrent`: 最大并发数
pub fn log_scenarios_loaded(total: usize, max_concurrent: usize) {
    info!("✓ 共 {} 个场景待运行", total);
    info!("📋 同时最多运行 {} 个\n", max_concurrent);
}

/// 打印最终统计信息
///
/// # 参数
/// - `summary`: 运行统计
/// - `log_file_path`: 日志文件路径
pub fn print_final_stats(summary: &RunSummary, log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部场景完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 通过: {}/{}", summary.passed, summary.total);
    info!("❌ 失败: {}", summary.failed);
    info!("⏭️ 跳过: {}", summary.skipped);
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        assert_eq!(truncate_text("中国移动公司", 4), "中国移动...");
        assert_eq!(truncate_text("short", 10), "short");
    }
}
