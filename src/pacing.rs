//! Request pacing
//!
//! A lane pauses after every remote request so one API key never exceeds its
//! published budget. The pause is behind the `Pacer` trait so tests can run
//! without real delays.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::RateLimitConfig;

/// Pause inserted after each remote request
pub trait Pacer: Send + Sync + 'static {
    fn pause(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Fixed-interval gate backed by `tokio::time::sleep`
#[derive(Debug, Clone, Copy)]
pub struct FixedIntervalPacer {
    interval: Duration,
}

impl FixedIntervalPacer {
    pub fn new(interval: Duration) -> Self {
        FixedIntervalPacer { interval }
    }

    pub fn from_rate_limit(limit: &RateLimitConfig) -> Self {
        Self::new(limit.pacing_interval())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Pacer for FixedIntervalPacer {
    fn pause(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(self.interval))
    }
}

/// No delay; counts pauses so tests can check the request budget
#[derive(Debug, Clone, Default)]
pub struct NoopPacer {
    pauses: Arc<AtomicU64>,
}

impl NoopPacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pauses taken across all clones
    pub fn pauses(&self) -> u64 {
        self.pauses.load(Ordering::SeqCst)
    }
}

impl Pacer for NoopPacer {
    fn pause(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        Box::pin(tokio::task::yield_now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fixed_interval_pauses_for_interval() {
        let pacer = FixedIntervalPacer::from_rate_limit(&RateLimitConfig::default());
        assert_eq!(pacer.interval(), Duration::from_millis(1400));

        let start = tokio::time::Instant::now();
        pacer.pause().await;
        assert!(start.elapsed() >= Duration::from_millis(1400));
    }

    #[tokio::test]
    async fn test_noop_pacer_counts() {
        let pacer = NoopPacer::new();
        let shared = pacer.clone();
        pacer.pause().await;
        shared.pause().await;
        assert_eq!(pacer.pauses(), 2);
    }
}
