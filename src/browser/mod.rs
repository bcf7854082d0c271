//! 浏览器资源
//!
//! 只在 UI 模式下使用：连接已运行的浏览器或启动无头浏览器，并为每个场景开新页面

use std::path::Path;
use std::time::Duration;

use chromiumoxide::handler::Handler;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::{HarnessError, HarnessResult};

/// 浏览器状态同步的等待时间
const SETTLE_DELAY: Duration = Duration::from_millis(300);

/// 按配置获取浏览器：配置了可执行文件就启动无头浏览器，否则连接调试端口
pub async fn open_browser(config: &Config) -> HarnessResult<Browser> {
    match &config.browser_executable {
        Some(executable) => launch_headless_browser(executable).await,
        None => connect_to_browser(config.browser_debug_port).await,
    }
}

/// 连接到已运行的浏览器（远程调试端口）
pub async fn connect_to_browser(port: u16) -> HarnessResult<Browser> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);

    let (browser, handler) = Browser::connect(&browser_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        e
    })?;
    debug!("浏览器连接成功");

    drive_events(handler).await;
    Ok(browser)
}

/// 启动无头浏览器
///
/// # 参数
/// - `executable`: 浏览器可执行文件路径
pub async fn launch_headless_browser(executable: &str) -> HarnessResult<Browser> {
    info!("🚀 启动无头浏览器: {}", executable);

    let config = BrowserConfig::builder()
        .new_headless_mode()
        .chrome_executable(Path::new(executable))
        .args(vec!["--disable-gpu", "--no-sandbox", "--disable-dev-shm-usage"])
        .build()
        .map_err(|e| HarnessError::Config(format!("配置无头浏览器失败: {}", e)))?;

    let (browser, handler) = Browser::launch(config).await.map_err(|e| {
        error!("启动无头浏览器失败: {}", e);
        e
    })?;

    drive_events(handler).await;
    info!("✅ 无头浏览器已就绪");
    Ok(browser)
}

/// 在后台处理浏览器事件，直到连接断开
async fn drive_events(mut handler: Handler) {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if event.is_err() {
                break;
            }
        }
    });
    sleep(SETTLE_DELAY).await;
}

/// 为一个场景创建独立页面
pub async fn new_scenario_page(browser: &Browser) -> HarnessResult<Page> {
    let page = browser.new_page("about:blank").await.map_err(|e| {
        error!("创建新页面失败: {}", e);
        e
    })?;
    Ok(page)
}
