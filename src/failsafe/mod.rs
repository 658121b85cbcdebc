//! Failsafe mechanisms: circuit breaker, rate limiting, metrics, retry backoff

mod circuit_breaker;
mod metrics;
mod rate_limiter;
mod retry;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitState};
pub use metrics::{MetricsSnapshot, ProviderMetrics};
pub use rate_limiter::{RateLimiter, WINDOW};
pub use retry::RetryPolicy;

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{BreakerConfig, ProviderDescriptor};
use crate::error::FailureKind;

/// Combined per-provider protection state
///
/// One instance per provider for the orchestrator's lifetime. Each completed
/// attempt updates breaker and metrics together; admission denials update
/// neither. Providers are guarded independently — no cross-provider lock.
#[derive(Clone)]
pub struct Failsafe {
    /// Circuit breaker
    pub circuit_breaker: Arc<CircuitBreaker>,
    /// Sliding-window admission control
    pub rate_limiter: Arc<RateLimiter>,
    /// Rolling statistics
    pub metrics: Arc<ProviderMetrics>,
}

impl Failsafe {
    /// Create protection state for one provider, applying its breaker
    /// override when present
    #[must_use]
    pub fn new(provider: &ProviderDescriptor, default_breaker: &BreakerConfig) -> Self {
        let breaker_config = provider.breaker.as_ref().unwrap_or(default_breaker);
        Self {
            circuit_breaker: Arc::new(CircuitBreaker::new(&provider.id, breaker_config)),
            rate_limiter: Arc::new(RateLimiter::new(provider.rate_limit_per_minute)),
            metrics: Arc::new(ProviderMetrics::new()),
        }
    }

    /// Whether the breaker admits a call at `now` (rate admission is
    /// checked separately, per attempt)
    #[must_use]
    pub fn is_available(&self, now: Instant) -> bool {
        self.circuit_breaker.is_available(now)
    }

    /// Record a successful attempt with its latency
    pub fn record_success(&self, latency: Duration) {
        self.circuit_breaker.record_success();
        self.metrics.record_attempt(true, latency, None);
    }

    /// Record a failed attempt observed at `now`
    pub fn record_failure(&self, kind: FailureKind, latency: Duration, now: Instant) {
        self.circuit_breaker.record_failure(now);
        self.metrics.record_attempt(false, latency, Some(kind));
    }
}

/// Failsafe table — per-provider protection state keyed by id
///
/// Populated once at orchestrator construction; lookups afterwards are
/// lock-free reads on independent shards.
pub struct FailsafeTable {
    entries: dashmap::DashMap<String, Failsafe>,
}

impl FailsafeTable {
    /// Build the table for all registered providers
    #[must_use]
    pub fn new(providers: &[Arc<ProviderDescriptor>], default_breaker: &BreakerConfig) -> Self {
        let entries = dashmap::DashMap::new();
        for provider in providers {
            entries.insert(provider.id.clone(), Failsafe::new(provider, default_breaker));
        }
        Self { entries }
    }

    /// Protection state for one provider
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Failsafe> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> ProviderDescriptor {
        serde_json::from_value(serde_json::json!({
            "id": "acme",
            "endpoint": "https://acme.example.com",
            "capabilities": ["document-ocr"],
            "rate_limit_per_minute": 5,
        }))
        .unwrap()
    }

    #[test]
    fn failure_updates_breaker_and_metrics_together() {
        let failsafe = Failsafe::new(&provider(), &BreakerConfig::default());
        let now = Instant::now();

        failsafe.record_failure(FailureKind::Transport, Duration::from_millis(20), now);

        let snap = failsafe.metrics.snapshot();
        assert_eq!(snap.attempts, 1);
        assert_eq!(snap.errors_by_kind.get(&FailureKind::Transport), Some(&1));
        assert_eq!(failsafe.circuit_breaker.snapshot(now).consecutive_failures, 1);
    }

    #[test]
    fn breaker_override_takes_precedence() {
        let mut descriptor = provider();
        descriptor.breaker = Some(BreakerConfig {
            failure_threshold: 1,
            ..BreakerConfig::default()
        });
        let failsafe = Failsafe::new(&descriptor, &BreakerConfig::default());
        let now = Instant::now();

        failsafe.record_failure(FailureKind::Timeout, Duration::from_millis(5), now);
        assert_eq!(failsafe.circuit_breaker.state(), CircuitState::Open);
    }

    #[test]
    fn success_resets_breaker_and_counts() {
        let failsafe = Failsafe::new(&provider(), &BreakerConfig::default());
        let now = Instant::now();

        failsafe.record_failure(FailureKind::Timeout, Duration::from_millis(5), now);
        failsafe.record_success(Duration::from_millis(30));

        let snap = failsafe.metrics.snapshot();
        assert_eq!(snap.attempts, 2);
        assert_eq!(snap.successes, 1);
        assert_eq!(failsafe.circuit_breaker.snapshot(now).consecutive_failures, 0);
    }
}
