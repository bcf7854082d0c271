//! 场景运行器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责场景的并发调度和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：初始化运行日志、创建边界工厂（UI 模式下连接浏览器）
//! 2. **并发控制**：使用 Semaphore 限制同时运行的场景数量
//! 3. **资源隔离**：每个场景从工厂拿到自己的边界实例
//! 4. **判定落盘**：每个场景结束后追加一行判定
//! 5. **全局统计**：汇总通过/失败/跳过数量

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Semaphore;
use tracing::{error, info, info_span, Instrument};

use crate::boundary::BoundaryFactory;
use crate::clock::{Clock, TokioClock};
use crate::config::Config;
use crate::report::{ScenarioReport, Verdict, VerdictWriter};
use crate::scenarios::{self, Scenario};
use crate::utils::logging;

/// 运行统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn from_reports(reports: &[ScenarioReport]) -> Self {
        let mut summary = Self {
            total: reports.len(),
            ..Default::default()
        };
        for report in reports {
            match report.verdict {
                Verdict::Pass => summary.passed += 1,
                Verdict::Fail => summary.failed += 1,
                Verdict::Skipped => summary.skipped += 1,
            }
        }
        summary
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// 场景运行器
///
/// 不关心单个场景的步骤，只负责调度、超时和收集报告
pub struct ScenarioRunner {
    config: Arc<Config>,
    factory: Arc<BoundaryFactory>,
    clock: Arc<dyn Clock>,
}

impl ScenarioRunner {
    pub fn new(config: Config, factory: BoundaryFactory, clock: Arc<dyn Clock>) -> Self {
        Self {
            config: Arc::new(config),
            factory: Arc::new(factory),
            clock,
        }
    }

    /// 并发运行场景，报告按传入顺序返回
    ///
    /// # 参数
    /// - `selected`: 要运行的场景
    ///
    /// # 返回
    /// 每个场景一份报告；任务崩溃或边界创建失败也会得到一份 Fail 报告
    pub async fn run_all(&self, selected: &[Scenario]) -> Result<Vec<ScenarioReport>> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_scenarios));
        let mut handles = Vec::with_capacity(selected.len());

        for (idx, &scenario) in selected.iter().enumerate() {
            let permit = semaphore.clone().acquire_owned().await?;
            let config = self.config.clone();
            let factory = self.factory.clone();
            let clock = self.clock.clone();
            let span = info_span!("scenario", index = idx + 1, name = scenario.name());

            let handle = tokio::spawn(
                async move {
                    let _permit = permit;
                    match factory.create().await {
                        Ok(boundary) => {
                            scenarios::run_scenario(scenario, &boundary, &config, clock).await
                        }
                        Err(e) => {
                            error!("[场景 {}] ❌ 创建边界失败: {}", scenario, e);
                            ScenarioReport::setup_failed(scenario.name(), factory.kind(), e.to_string())
                        }
                    }
                }
                .instrument(span),
            );
            handles.push((scenario, handle));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (scenario, handle) in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!("[场景 {}] 任务执行失败: {}", scenario, e);
                    reports.push(ScenarioReport::setup_failed(
                        scenario.name(),
                        self.factory.kind(),
                        format!("任务执行失败: {}", e),
                    ));
                }
            }
        }

        Ok(reports)
    }
}

/// 应用主结构
pub struct App {
    writer: VerdictWriter,
    runner: ScenarioRunner,
    max_concurrent: usize,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        config.validate()?;

        let writer = VerdictWriter::with_path(&config.output_log_file);
        writer.init()?;

        logging::log_startup(&config);

        let factory = BoundaryFactory::initialize(&config).await?;
        let max_concurrent = config.max_concurrent_scenarios;
        let runner = ScenarioRunner::new(config, factory, Arc::new(TokioClock::new()));

        Ok(Self {
            writer,
            runner,
            max_concurrent,
        })
    }

    /// 运行选定的场景；为空时运行全部
    pub async fn run(&self, selected: &[Scenario]) -> Result<RunSummary> {
        let scenarios = if selected.is_empty() {
            scenarios::catalogue()
        } else {
            selected.to_vec()
        };
        logging::log_scenarios_loaded(scenarios.len(), self.max_concurrent);

        let reports = self.runner.run_all(&scenarios).await?;
        for report in &reports {
            if let Err(e) = self.writer.write(report) {
                error!("写入判定失败: {}", e);
            }
        }

        let summary = RunSummary::from_reports(&reports);
        logging::print_final_stats(&summary, self.writer.path());
        if !summary.all_passed() {
            for report in reports.iter().filter(|r| r.verdict == Verdict::Fail) {
                info!("❌ {}", report.summary_line());
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(verdict: Verdict) -> ScenarioReport {
        let mut report = ScenarioReport::setup_failed("x", crate::config::BoundaryKind::Api, String::new());
        report.verdict = verdict;
        report
    }

    #[test]
    fn test_summary_counts_verdicts() {
        let summary = RunSummary::from_reports(&[
            report(Verdict::Pass),
            report(Verdict::Fail),
            report(Verdict::Skipped),
            report(Verdict::Pass),
        ]);
        assert_eq!(
            summary,
            RunSummary {
                total: 4,
                passed: 2,
                failed: 1,
                skipped: 1
            }
        );
        assert!(!summary.all_passed());
    }

    #[test]
    fn test_skipped_does_not_fail_run() {
        let summary = RunSummary::from_reports(&[report(Verdict::Pass), report(Verdict::Skipped)]);
        assert!(summary.all_passed());
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_every_scenario() {
        let config = Config {
            api_base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_ms: 200,
            transport_retries: 0,
            transport_retry_delay_ms: 1,
            ..Config::default()
        };
        let factory = BoundaryFactory::initialize(&config).await.unwrap();
        let runner = ScenarioRunner::new(config, factory, Arc::new(TokioClock::new()));

        let reports = runner
            .run_all(&[Scenario::SubmitAndObserve, Scenario::InvalidLogin])
            .await
            .unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].scenario, "submit-and-observe");
        assert!(reports.iter().all(|r| r.verdict == Verdict::Fail));
    }
}
