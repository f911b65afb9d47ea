use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::config::DelayRange;

/// Pick a uniformly random delay within `range` (inclusive).
///
/// Non-cryptographic; only meant to avoid a perfectly regular click rhythm.
pub fn jitter(range: DelayRange) -> Duration {
    if range.max_ms <= range.min_ms {
        return Duration::from_millis(range.min_ms);
    }
    let ms = rand::thread_rng().gen_range(range.min_ms..=range.max_ms);
    Duration::from_millis(ms)
}

/// Suspends the run between steps.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn sleep(&self, duration: Duration);

    /// Sleep for a random delay drawn from `range`.
    async fn pause(&self, range: DelayRange) {
        let delay = jitter(range);
        self.sleep(delay).await;
    }
}

/// Pacer that really waits, using the tokio timer.
#[derive(Debug, Clone, Default)]
pub struct HumanPacer;

#[async_trait]
impl Pacer for HumanPacer {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}
