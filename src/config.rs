//! Configuration for the orchestrator
//!
//! Provider descriptors arrive already parsed (file loading lives in the
//! platform's config service, not here). Everything is validated once at
//! construction; descriptors are immutable afterwards and shared read-only
//! across requests.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capability::Capability;
use crate::{Error, Result};

/// Immutable description of one external verification provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// Unique provider identifier (e.g. "acme-ocr")
    pub id: String,
    /// Human-readable name for reports and logs
    #[serde(default)]
    pub display_name: String,
    /// Opaque endpoint reference handed to the transport layer
    pub endpoint: String,
    /// Opaque credentials reference handed to the transport layer.
    /// Never a secret itself — resolution happens inside the transport.
    #[serde(default)]
    pub credentials_ref: String,
    /// Capabilities this provider can fulfill
    pub capabilities: Vec<Capability>,
    /// Static priority rank, lower = preferred
    #[serde(default = "defaults::priority")]
    pub priority: u32,
    /// Cost per call in account currency units
    #[serde(default)]
    pub cost_per_call: f64,
    /// Per-call timeout
    #[serde(default = "defaults::call_timeout", with = "humantime_serde")]
    pub call_timeout: Duration,
    /// Retries per request against this provider (attempts = retries + 1)
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,
    /// Admission limit within any trailing 60-second window
    pub rate_limit_per_minute: u32,
    /// Latency this provider is expected to meet; breaches are logged
    #[serde(default = "defaults::sla_target", with = "humantime_serde")]
    pub sla_target: Duration,
    /// Per-provider circuit breaker override (falls back to the global default)
    #[serde(default)]
    pub breaker: Option<BreakerConfig>,
}

impl ProviderDescriptor {
    /// Validate one descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::Config("provider id must not be empty".into()));
        }
        if self.endpoint.trim().is_empty() {
            return Err(Error::Config(format!("provider '{}': endpoint must not be empty", self.id)));
        }
        if self.capabilities.is_empty() {
            return Err(Error::Config(format!(
                "provider '{}': at least one capability required",
                self.id
            )));
        }
        if self.rate_limit_per_minute == 0 {
            return Err(Error::Config(format!(
                "provider '{}': rate_limit_per_minute must be positive",
                self.id
            )));
        }
        if self.cost_per_call < 0.0 {
            return Err(Error::Config(format!(
                "provider '{}': cost_per_call must not be negative",
                self.id
            )));
        }
        if self.call_timeout.is_zero() {
            return Err(Error::Config(format!(
                "provider '{}': call_timeout must be positive",
                self.id
            )));
        }
        if let Some(breaker) = &self.breaker {
            breaker.validate(&self.id)?;
        }
        Ok(())
    }

    /// Name used in logs: display name when set, id otherwise
    #[must_use]
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.id
        } else {
            &self.display_name
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures before opening
    pub failure_threshold: u32,
    /// Consecutive half-open successes before closing
    pub success_threshold: u32,
    /// Time an open breaker waits before permitting probes
    #[serde(with = "humantime_serde")]
    pub cool_down: Duration,
    /// Secondary trigger: failures within `burst_window` before opening,
    /// even when successes interleave
    pub burst_threshold: u32,
    /// Trailing window for the burst trigger
    #[serde(with = "humantime_serde")]
    pub burst_window: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            cool_down: Duration::from_secs(30),
            burst_threshold: 5,
            burst_window: Duration::from_secs(60),
        }
    }
}

impl BreakerConfig {
    fn validate(&self, provider: &str) -> Result<()> {
        if self.failure_threshold == 0 || self.success_threshold == 0 || self.burst_threshold == 0 {
            return Err(Error::Config(format!(
                "provider '{provider}': breaker thresholds must be positive"
            )));
        }
        if self.cool_down.is_zero() {
            return Err(Error::Config(format!(
                "provider '{provider}': breaker cool_down must be positive"
            )));
        }
        Ok(())
    }
}

/// Retry backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Exponential base: attempt k sleeps `backoff_base^k` seconds
    pub backoff_base: f64,
    /// Cap on any single backoff sleep
    #[serde(with = "humantime_serde")]
    pub backoff_max: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            backoff_base: 2.0,
            backoff_max: Duration::from_secs(30),
        }
    }
}

/// Weights for the cost-optimization score
///
/// `score = cost_weight / (cost + epsilon) + success_weight * success_rate
///        + latency_weight / (mean_latency_secs + 1)`
///
/// The defaults are tuned empirically, not derived; treat them as knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    /// Weight on inverse cost
    pub cost_weight: f64,
    /// Weight on measured success rate
    pub success_weight: f64,
    /// Weight on inverse mean latency
    pub latency_weight: f64,
    /// Guard against division by zero for free providers
    pub epsilon: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            cost_weight: 0.4,
            success_weight: 0.4,
            latency_weight: 0.2,
            epsilon: 0.001,
        }
    }
}

/// Top-level orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Provider descriptors, in declaration order
    pub providers: Vec<ProviderDescriptor>,
    /// Rank candidates by measured cost/quality instead of static priority
    #[serde(default)]
    pub cost_optimization: bool,
    /// Scoring weights used when cost optimization is enabled
    #[serde(default)]
    pub score_weights: ScoreWeights,
    /// Default breaker settings for providers without an override
    #[serde(default)]
    pub breaker: BreakerConfig,
    /// Retry backoff settings (shared by all providers)
    #[serde(default)]
    pub retry: RetryConfig,
    /// Bounded wait when the only remaining candidate is rate-limited.
    /// Admission denial otherwise fails over immediately.
    #[serde(default = "defaults::rate_limit_wait", with = "humantime_serde")]
    pub rate_limit_wait: Duration,
}

impl OrchestratorConfig {
    /// Validate the whole configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on the first violated constraint, including
    /// duplicate provider ids.
    pub fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            return Err(Error::Config("at least one provider required".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            provider.validate()?;
            if !seen.insert(provider.id.as_str()) {
                return Err(Error::Config(format!("duplicate provider id: '{}'", provider.id)));
            }
        }
        if self.retry.backoff_base < 1.0 {
            return Err(Error::Config("retry backoff_base must be >= 1".into()));
        }
        Ok(())
    }
}

mod defaults {
    use std::time::Duration;

    pub fn priority() -> u32 {
        100
    }

    pub fn max_retries() -> u32 {
        2
    }

    pub fn call_timeout() -> Duration {
        Duration::from_secs(10)
    }

    pub fn sla_target() -> Duration {
        Duration::from_secs(5)
    }

    pub fn rate_limit_wait() -> Duration {
        Duration::from_secs(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str) -> ProviderDescriptor {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "endpoint": format!("https://{id}.example.com/v1"),
            "capabilities": ["document-ocr"],
            "rate_limit_per_minute": 60,
        }))
        .unwrap()
    }

    #[test]
    fn descriptor_defaults_apply() {
        let p = descriptor("acme");
        assert_eq!(p.priority, 100);
        assert_eq!(p.max_retries, 2);
        assert_eq!(p.call_timeout, Duration::from_secs(10));
        assert_eq!(p.sla_target, Duration::from_secs(5));
        assert!(p.breaker.is_none());
        assert!(p.validate().is_ok());
    }

    #[test]
    fn descriptor_rejects_zero_rate_limit() {
        let mut p = descriptor("acme");
        p.rate_limit_per_minute = 0;
        assert!(matches!(p.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn descriptor_rejects_empty_capabilities() {
        let mut p = descriptor("acme");
        p.capabilities.clear();
        assert!(matches!(p.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn descriptor_rejects_negative_cost() {
        let mut p = descriptor("acme");
        p.cost_per_call = -0.01;
        assert!(p.validate().is_err());
    }

    #[test]
    fn config_rejects_duplicate_ids() {
        let config = OrchestratorConfig {
            providers: vec![descriptor("acme"), descriptor("acme")],
            cost_optimization: false,
            score_weights: ScoreWeights::default(),
            breaker: BreakerConfig::default(),
            retry: RetryConfig::default(),
            rate_limit_wait: Duration::from_secs(1),
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn config_rejects_empty_provider_list() {
        let config = OrchestratorConfig {
            providers: vec![],
            cost_optimization: false,
            score_weights: ScoreWeights::default(),
            breaker: BreakerConfig::default(),
            retry: RetryConfig::default(),
            rate_limit_wait: Duration::from_secs(1),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn durations_parse_from_humantime() {
        let p: ProviderDescriptor = serde_json::from_value(serde_json::json!({
            "id": "acme",
            "endpoint": "https://acme.example.com",
            "capabilities": ["liveness"],
            "rate_limit_per_minute": 10,
            "call_timeout": "2s 500ms",
            "sla_target": "800ms",
        }))
        .unwrap();
        assert_eq!(p.call_timeout, Duration::from_millis(2500));
        assert_eq!(p.sla_target, Duration::from_millis(800));
    }

    #[test]
    fn breaker_defaults() {
        let b = BreakerConfig::default();
        assert_eq!(b.failure_threshold, 5);
        assert_eq!(b.success_threshold, 3);
        assert_eq!(b.cool_down, Duration::from_secs(30));
        assert_eq!(b.burst_threshold, 5);
        assert_eq!(b.burst_window, Duration::from_secs(60));
    }
}
