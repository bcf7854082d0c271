use std::path::Path;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use qa_job_verify::utils::logging;
use qa_job_verify::{App, Config, Scenario};

/// 配置文件路径；未设置时只读环境变量
const CONFIG_PATH_ENV: &str = "QA_CONFIG";

fn load_config() -> Result<Config> {
    match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) => Config::from_toml_file(Path::new(&path))
            .with_context(|| format!("无法加载配置文件: {}", path)),
        Err(_) => Ok(Config::from_env()),
    }
}

/// 命令行参数为场景名，为空时运行全部
fn selected_scenarios() -> Result<Vec<Scenario>> {
    let mut selected = Vec::new();
    for name in std::env::args().skip(1) {
        match Scenario::from_name(&name) {
            Some(scenario) => selected.push(scenario),
            None => bail!("未知场景: {}", name),
        }
    }
    Ok(selected)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // 加载配置
    let config = load_config()?;

    // 初始化日志
    logging::init(config.verbose_logging);

    let selected = selected_scenarios()?;

    // 初始化并运行应用
    let summary = App::initialize(config).await?.run(&selected).await?;

    Ok(if summary.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
