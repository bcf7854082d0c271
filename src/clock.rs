//! 时钟抽象
//!
//! 观测引擎通过 [`Clock`] 计时和等待，测试中用 [`ManualClock`] 替换，不需要真实等待

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

#[async_trait]
pub trait Clock: Send + Sync {
    /// 从时钟创建起经过的时间
    fn elapsed(&self) -> Duration;

    async fn sleep(&self, duration: Duration);
}

/// 基于 tokio 的真实时钟
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// 手动时钟：`sleep` 立即返回并把虚拟时间向前推进
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        self.nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances_on_sleep() {
        let clock = ManualClock::new();
        assert_eq!(clock.elapsed(), Duration::ZERO);

        tokio_test::block_on(clock.sleep(Duration::from_millis(250)));
        clock.advance(Duration::from_millis(50));

        assert_eq!(clock.elapsed(), Duration::from_millis(300));

        // 克隆共享同一条时间线
        let other = clock.clone();
        tokio_test::block_on(other.sleep(Duration::from_secs(1)));
        assert_eq!(clock.elapsed(), Duration::from_millis(1300));
    }

    #[tokio::test]
    async fn test_tokio_clock_follows_runtime_time() {
        let clock = TokioClock::new();
        clock.sleep(Duration::from_millis(20)).await;
        assert!(clock.elapsed() >= Duration::from_millis(20));
    }
}
