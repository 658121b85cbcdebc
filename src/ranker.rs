//! Candidate selection and ordering
//!
//! Produces the ordered provider list one request walks: registry filter,
//! breaker availability filter, then either static priority order or — when
//! cost optimization is on — descending weighted score over price, measured
//! success rate and mean latency.

use std::sync::Arc;
use std::time::Instant;

use tracing::trace;

use crate::capability::Capability;
use crate::config::{ProviderDescriptor, ScoreWeights};
use crate::failsafe::FailsafeTable;
use crate::registry::CapabilityRegistry;

/// Provider ranker
pub struct ProviderRanker {
    registry: Arc<CapabilityRegistry>,
    failsafes: Arc<FailsafeTable>,
    cost_optimization: bool,
    weights: ScoreWeights,
}

impl ProviderRanker {
    /// Create a ranker over the registry and protection table
    #[must_use]
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        failsafes: Arc<FailsafeTable>,
        cost_optimization: bool,
        weights: ScoreWeights,
    ) -> Self {
        Self {
            registry,
            failsafes,
            cost_optimization,
            weights,
        }
    }

    /// Ordered candidate list for `capability` at `now`.
    ///
    /// Providers whose breaker rejects calls are filtered out entirely —
    /// the failover loop never sees them. Checking availability performs the
    /// lazy open → half-open transition, so a cooled-down provider re-enters
    /// the list by being asked.
    #[must_use]
    pub fn candidates(&self, capability: Capability, now: Instant) -> Vec<Arc<ProviderDescriptor>> {
        let mut available: Vec<Arc<ProviderDescriptor>> = self
            .registry
            .providers_for(capability)
            .iter()
            .filter(|provider| {
                self.failsafes
                    .get(&provider.id)
                    .is_some_and(|failsafe| failsafe.is_available(now))
            })
            .cloned()
            .collect();

        if self.cost_optimization {
            let mut scored: Vec<(f64, Arc<ProviderDescriptor>)> = available
                .drain(..)
                .map(|provider| (self.score(&provider), provider))
                .collect();
            scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
            for (score, provider) in &scored {
                trace!(provider = %provider.id, score, %capability, "Ranked candidate");
            }
            scored.into_iter().map(|(_, provider)| provider).collect()
        } else {
            available.sort_by_key(|provider| provider.priority);
            available
        }
    }

    /// Weighted cost/quality score, higher = preferred.
    ///
    /// Providers with no traffic yet are scored on price alone so a fresh
    /// (or newly configured) provider is not starved before any request has
    /// been routed to it.
    fn score(&self, provider: &ProviderDescriptor) -> f64 {
        let w = &self.weights;
        let cost_term = w.cost_weight / (provider.cost_per_call + w.epsilon);

        let Some(failsafe) = self.failsafes.get(&provider.id) else {
            return cost_term;
        };
        if failsafe.metrics.attempts() == 0 {
            return cost_term;
        }

        let snapshot = failsafe.metrics.snapshot();
        let mean_latency_secs = snapshot.mean_latency_ms.unwrap_or(0.0) / 1000.0;
        cost_term
            + w.success_weight * snapshot.success_rate
            + w.latency_weight / (mean_latency_secs + 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakerConfig;
    use crate::error::FailureKind;
    use std::time::Duration;

    fn descriptor(id: &str, priority: u32, cost: f64) -> ProviderDescriptor {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "endpoint": format!("https://{id}.example.com"),
            "capabilities": ["face-match"],
            "priority": priority,
            "cost_per_call": cost,
            "rate_limit_per_minute": 60,
        }))
        .unwrap()
    }

    fn ranker(providers: Vec<ProviderDescriptor>, cost_optimization: bool) -> ProviderRanker {
        let registry = Arc::new(CapabilityRegistry::new(providers));
        let failsafes = Arc::new(FailsafeTable::new(
            registry.all(),
            &BreakerConfig::default(),
        ));
        ProviderRanker::new(
            registry,
            failsafes,
            cost_optimization,
            ScoreWeights::default(),
        )
    }

    fn ids(candidates: &[Arc<ProviderDescriptor>]) -> Vec<&str> {
        candidates.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn priority_order_when_cost_optimization_off() {
        let ranker = ranker(
            vec![
                descriptor("slow", 20, 0.01),
                descriptor("fast", 1, 0.50),
                descriptor("mid", 10, 0.10),
            ],
            false,
        );
        let candidates = ranker.candidates(Capability::FaceMatch, Instant::now());
        assert_eq!(ids(&candidates), ["fast", "mid", "slow"]);
    }

    #[test]
    fn unavailable_providers_are_filtered_out() {
        let ranker = ranker(vec![descriptor("a", 1, 0.1), descriptor("b", 2, 0.1)], false);
        let now = Instant::now();

        // Trip a's breaker.
        let failsafe = ranker.failsafes.get("a").unwrap();
        for _ in 0..BreakerConfig::default().failure_threshold {
            failsafe.record_failure(FailureKind::Timeout, Duration::from_millis(5), now);
        }

        let candidates = ranker.candidates(Capability::FaceMatch, now);
        assert_eq!(ids(&candidates), ["b"]);
    }

    #[test]
    fn cooled_down_provider_reenters_candidates() {
        let ranker = ranker(vec![descriptor("a", 1, 0.1)], false);
        let now = Instant::now();

        let failsafe = ranker.failsafes.get("a").unwrap();
        for _ in 0..BreakerConfig::default().failure_threshold {
            failsafe.record_failure(FailureKind::Timeout, Duration::from_millis(5), now);
        }
        assert!(ranker.candidates(Capability::FaceMatch, now).is_empty());

        let after_cool_down = now + BreakerConfig::default().cool_down;
        assert_eq!(
            ids(&ranker.candidates(Capability::FaceMatch, after_cool_down)),
            ["a"]
        );
    }

    /// Like `descriptor` but with a breaker that tolerates the failure
    /// volumes these tests record.
    fn lenient_descriptor(id: &str, priority: u32, cost: f64) -> ProviderDescriptor {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "endpoint": format!("https://{id}.example.com"),
            "capabilities": ["face-match"],
            "priority": priority,
            "cost_per_call": cost,
            "rate_limit_per_minute": 60,
            "breaker": { "failure_threshold": 1000, "burst_threshold": 1000 },
        }))
        .unwrap()
    }

    #[test]
    fn cheap_reliable_provider_outranks_expensive_one() {
        let ranker = ranker(
            vec![
                lenient_descriptor("pricey", 1, 0.10),
                lenient_descriptor("cheap", 2, 0.05),
            ],
            true,
        );

        // cheap: 99% success; pricey: 95% — both with similar latency.
        let cheap = ranker.failsafes.get("cheap").unwrap();
        let pricey = ranker.failsafes.get("pricey").unwrap();
        let now = Instant::now();
        for i in 0..100 {
            if i < 99 {
                cheap.record_success(Duration::from_millis(100));
            } else {
                cheap.record_failure(FailureKind::Transport, Duration::from_millis(100), now);
            }
            if i < 95 {
                pricey.record_success(Duration::from_millis(100));
            } else {
                pricey.record_failure(FailureKind::Transport, Duration::from_millis(100), now);
            }
        }

        let candidates = ranker.candidates(Capability::FaceMatch, now);
        assert_eq!(ids(&candidates), ["cheap", "pricey"]);
    }

    #[test]
    fn cold_provider_is_ranked_by_price_alone() {
        let ranker = ranker(
            vec![descriptor("warm", 1, 0.10), descriptor("cold", 2, 0.02)],
            true,
        );

        let warm = ranker.failsafes.get("warm").unwrap();
        for _ in 0..50 {
            warm.record_success(Duration::from_millis(80));
        }

        // cold has no metrics but its price term (0.4 / 0.021 ≈ 19) beats
        // warm's full score (0.4 / 0.101 + 0.4 + 0.2 ≈ 4.6).
        let candidates = ranker.candidates(Capability::FaceMatch, Instant::now());
        assert_eq!(ids(&candidates), ["cold", "warm"]);
    }
}
