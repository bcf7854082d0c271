//! 判定写入服务
//!
//! 只负责"把场景判定追加到运行日志"，不关心场景怎么跑

use std::fs::{self, OpenOptions};
use std::io::Write;

use tracing::debug;

use crate::error::HarnessResult;
use crate::report::checks::ScenarioReport;

/// 判定写入服务
///
/// 职责：
/// - 创建带时间戳表头的运行日志
/// - 每个场景追加一行判定
pub struct VerdictWriter {
    log_file_path: String,
}

impl VerdictWriter {
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            log_file_path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.log_file_path
    }

    /// 初始化日志文件（覆盖旧内容）
    pub fn init(&self) -> HarnessResult<()> {
        let log_header = format!(
            "{}\n任务生命周期验证日志 - {}\n{}\n\n",
            "=".repeat(60),
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            "=".repeat(60)
        );
        fs::write(&self.log_file_path, log_header)?;
        Ok(())
    }

    /// 追加一个场景的判定
    ///
    /// # 参数
    /// - `report`: 场景报告
    pub fn write(&self, report: &ScenarioReport) -> HarnessResult<()> {
        debug!("写入判定: {} {}", report.scenario, report.verdict);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file_path)?;

        let line = format!(
            "{} {}\n",
            chrono::Local::now().format("%H:%M:%S"),
            report.summary_line()
        );
        file.write_all(line.as_bytes())?;

        Ok(())
    }
}
