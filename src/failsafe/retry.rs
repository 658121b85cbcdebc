//! Retry backoff schedule

use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};

use crate::config::RetryConfig;

/// Retry policy shared by all providers
///
/// Produces the delay sequence `min(backoff_base^k, backoff_max)` seconds for
/// attempt indexes k = 0, 1, 2, ... The failover controller drives the loop
/// itself (admission checks and state recording happen between attempts), so
/// this type only hands out the schedule.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    backoff_base: f64,
    backoff_max: Duration,
}

impl RetryPolicy {
    /// Create from config
    #[must_use]
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            backoff_base: config.backoff_base,
            backoff_max: config.backoff_max,
        }
    }

    /// Fresh delay iterator for one provider's attempt loop
    #[allow(clippy::cast_possible_truncation)]
    pub fn schedule(&self) -> impl Iterator<Item = Duration> {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_secs(1))
            .with_max_delay(self.backoff_max)
            .with_factor(self.backoff_base as f32)
            .without_max_times()
            .build()
    }
}
