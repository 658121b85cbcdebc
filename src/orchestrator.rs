//! Orchestrator facade
//!
//! Public entry point wiring registry, ranking, failsafes and the failover
//! controller together. One instance per process; everything it needs is an
//! explicit field — construction is the only wiring step, and there is no
//! ambient global state.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capability::Capability;
use crate::config::OrchestratorConfig;
use crate::error::ProviderFailure;
use crate::failover::{now_instant, AttemptRecord, AttemptStatus, FailoverController};
use crate::failsafe::{CircuitState, FailsafeTable, RetryPolicy};
use crate::ranker::ProviderRanker;
use crate::registry::CapabilityRegistry;
use crate::transport::ProviderCall;
use crate::{Error, Result};

/// Caller-supplied priority, carried through spans and outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPriority {
    /// Batch / background work
    Low,
    /// Interactive verification flows
    #[default]
    Normal,
    /// Regulatory or time-critical checks
    High,
}

impl std::fmt::Display for RequestPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
        }
    }
}

/// One logical verification request
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    /// Capability to satisfy
    pub capability: Capability,
    /// Opaque provider payload
    pub payload: Value,
    /// Request priority
    pub priority: RequestPriority,
    /// Total time budget across all providers, retries and backoff
    pub deadline: Duration,
}

impl ExecuteRequest {
    /// Default time budget for a logical request
    pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

    /// Create a request with default priority and deadline
    #[must_use]
    pub fn new(capability: Capability, payload: Value) -> Self {
        Self {
            capability,
            payload,
            priority: RequestPriority::default(),
            deadline: Self::DEFAULT_DEADLINE,
        }
    }

    /// Set the priority
    #[must_use]
    pub fn with_priority(mut self, priority: RequestPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the total time budget
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Result of a satisfied request
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    /// Request id (also stamped on every log line for this request)
    pub request_id: Uuid,
    /// Provider that answered
    pub provider_id: String,
    /// Provider response payload
    pub response: Value,
    /// Total wall-clock time spent, including failed candidates
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    /// Real attempts made across all providers (admission denials excluded)
    pub attempts: u32,
    /// Per-attempt trail for observability
    pub trail: Vec<AttemptRecord>,
}

/// Per-provider entry in the health report
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    /// Provider id
    pub provider_id: String,
    /// Display name
    pub display_name: String,
    /// Breaker state
    pub state: CircuitState,
    /// Consecutive failures seen by the breaker
    pub consecutive_failures: u32,
    /// Seconds until an open breaker admits a probe
    pub seconds_until_probe: Option<u64>,
    /// successes / attempts (1.0 with no traffic)
    pub success_rate: f64,
    /// Mean recent latency
    pub mean_latency_ms: Option<f64>,
    /// 95th percentile recent latency
    pub p95_latency_ms: Option<u64>,
    /// Total attempts (including retries)
    pub attempts: u64,
}

/// Per-provider entry in the cost report
#[derive(Debug, Clone, Serialize)]
pub struct ProviderCost {
    /// Provider id
    pub provider_id: String,
    /// Attempts inside the report window
    pub attempts: u64,
    /// attempts × cost-per-call
    pub total_cost: f64,
}

/// Multi-provider request orchestrator
pub struct Orchestrator {
    registry: Arc<CapabilityRegistry>,
    failsafes: Arc<FailsafeTable>,
    ranker: ProviderRanker,
    failover: FailoverController,
}

impl Orchestrator {
    /// Build an orchestrator from validated configuration and an injected
    /// transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the configuration is invalid.
    pub fn new(config: OrchestratorConfig, transport: Arc<dyn ProviderCall>) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(CapabilityRegistry::new(config.providers));
        let failsafes = Arc::new(FailsafeTable::new(registry.all(), &config.breaker));
        let ranker = ProviderRanker::new(
            Arc::clone(&registry),
            Arc::clone(&failsafes),
            config.cost_optimization,
            config.score_weights,
        );
        let failover = FailoverController::new(
            transport,
            RetryPolicy::new(&config.retry),
            config.rate_limit_wait,
        );

        info!(providers = registry.len(), "Orchestrator ready");
        Ok(Self {
            registry,
            failsafes,
            ranker,
            failover,
        })
    }

    /// Satisfy one capability request.
    ///
    /// Candidates are attempted strictly in ranked order, never in parallel;
    /// the first success wins. Terminal errors are
    /// [`Error::NoCapableProvider`], [`Error::AllProvidersExhausted`] and
    /// [`Error::DeadlineExceeded`] — everything else stays internal to the
    /// retry/failover loop.
    #[tracing::instrument(
        skip(self, request),
        fields(capability = %request.capability, priority = %request.priority)
    )]
    pub async fn execute(&self, request: ExecuteRequest) -> Result<Outcome> {
        let request_id = Uuid::new_v4();
        let started = now_instant();
        let deadline = started + request.deadline;

        let candidates = self.ranker.candidates(request.capability, started);
        if candidates.is_empty() {
            warn!(%request_id, capability = %request.capability, "No capable provider available");
            return Err(Error::NoCapableProvider(request.capability));
        }
        debug!(
            %request_id,
            candidates = candidates.len(),
            "Dispatching to ranked candidates"
        );

        let total = candidates.len();
        let mut failures: Vec<ProviderFailure> = Vec::new();
        let mut trail: Vec<AttemptRecord> = Vec::new();

        for (index, provider) in candidates.iter().enumerate() {
            // The table is built from the registry, so the entry exists.
            let Some(failsafe) = self.failsafes.get(&provider.id) else {
                continue;
            };

            let outcome = self
                .failover
                .attempt_provider(
                    provider,
                    &failsafe,
                    &request.payload,
                    deadline,
                    index + 1 == total,
                )
                .await;

            match outcome {
                Ok(success) => {
                    trail.extend(success.trail);
                    let elapsed = now_instant().duration_since(started);
                    let attempts = real_attempts(&trail);
                    info!(
                        %request_id,
                        provider = %provider.id,
                        attempts,
                        elapsed_ms = elapsed.as_millis(),
                        "Request satisfied"
                    );
                    return Ok(Outcome {
                        request_id,
                        provider_id: provider.id.clone(),
                        response: success.response,
                        elapsed,
                        attempts,
                        trail,
                    });
                }
                Err(failure) => {
                    trail.extend(failure.trail);
                    if matches!(failure.error, Error::DeadlineExceeded) {
                        // Budget ran out before this provider could be tried.
                        if failures.is_empty() {
                            warn!(%request_id, "Deadline exceeded before any provider attempt");
                            return Err(Error::DeadlineExceeded);
                        }
                        break;
                    }
                    debug!(
                        %request_id,
                        provider = %provider.id,
                        error = %failure.error,
                        "Provider exhausted, failing over"
                    );
                    failures.push(ProviderFailure {
                        provider_id: provider.id.clone(),
                        error: failure.error.to_string(),
                    });
                }
            }
        }

        warn!(
            %request_id,
            capability = %request.capability,
            tried = failures.len(),
            "All providers exhausted"
        );
        Err(Error::AllProvidersExhausted {
            capability: request.capability,
            failures,
        })
    }

    /// Read-only per-provider health: breaker state plus metrics snapshot
    #[must_use]
    pub fn health_report(&self) -> Vec<ProviderHealth> {
        let now = now_instant();
        self.registry
            .all()
            .iter()
            .filter_map(|provider| {
                let failsafe = self.failsafes.get(&provider.id)?;
                let breaker = failsafe.circuit_breaker.snapshot(now);
                let metrics = failsafe.metrics.snapshot();
                Some(ProviderHealth {
                    provider_id: provider.id.clone(),
                    display_name: provider.label().to_string(),
                    state: breaker.state,
                    consecutive_failures: breaker.consecutive_failures,
                    seconds_until_probe: breaker.seconds_until_probe,
                    success_rate: metrics.success_rate,
                    mean_latency_ms: metrics.mean_latency_ms,
                    p95_latency_ms: metrics.p95_latency_ms,
                    attempts: metrics.attempts,
                })
            })
            .collect()
    }

    /// Accrued cost per provider between `start` and `end` (minute
    /// granularity, in-memory history only)
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cost_report(&self, start: SystemTime, end: SystemTime) -> Vec<ProviderCost> {
        self.registry
            .all()
            .iter()
            .filter_map(|provider| {
                let failsafe = self.failsafes.get(&provider.id)?;
                let attempts = failsafe.metrics.attempts_between(start, end);
                Some(ProviderCost {
                    provider_id: provider.id.clone(),
                    attempts,
                    total_cost: attempts as f64 * provider.cost_per_call,
                })
            })
            .collect()
    }

    /// The immutable provider registry
    #[must_use]
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }
}

/// Attempts that actually reached a provider (admission denials excluded)
#[allow(clippy::cast_possible_truncation)]
fn real_attempts(trail: &[AttemptRecord]) -> u32 {
    trail
        .iter()
        .filter(|record| !matches!(record.status, AttemptStatus::RateLimited))
        .count() as u32
}
