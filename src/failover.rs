//! Per-provider attempt loop: bounded retries with backoff
//!
//! Drives every try against ONE provider — admission check, the transport
//! call bounded by timeout and deadline, breaker/metrics recording, and the
//! backoff sleep between tries. Walking the candidate list is the facade's
//! job; this module never moves to another provider on its own.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::ProviderDescriptor;
use crate::error::FailureKind;
use crate::failsafe::{Failsafe, RetryPolicy};
use crate::transport::ProviderCall;
use crate::Error;

/// Current instant, read through the tokio clock so deadlines, admission
/// windows and backoff sleeps all advance together (also under the test
/// clock).
pub(crate) fn now_instant() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// One entry in a request's attempt trail
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    /// Provider attempted
    pub provider_id: String,
    /// Zero-based attempt index within that provider
    pub attempt: u32,
    /// Observed latency (zero for admission denials)
    pub latency_ms: u64,
    /// What happened
    pub status: AttemptStatus,
}

/// Outcome of a single attempt
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// The call succeeded
    Success,
    /// The call failed with the given classification
    Failed(FailureKind),
    /// Admission denied by the rate limiter; no call was made
    RateLimited,
}

/// Successful result of one provider's attempt loop
pub(crate) struct ProviderSuccess {
    pub response: Value,
    pub trail: Vec<AttemptRecord>,
}

/// Failed result of one provider's attempt loop
pub(crate) struct ProviderError {
    pub error: Error,
    pub trail: Vec<AttemptRecord>,
}

/// Retry/failover controller
pub(crate) struct FailoverController {
    transport: Arc<dyn ProviderCall>,
    retry_policy: RetryPolicy,
    rate_limit_wait: Duration,
}

impl FailoverController {
    pub(crate) fn new(
        transport: Arc<dyn ProviderCall>,
        retry_policy: RetryPolicy,
        rate_limit_wait: Duration,
    ) -> Self {
        Self {
            transport,
            retry_policy,
            rate_limit_wait,
        }
    }

    /// Run the attempt loop for one provider.
    ///
    /// Up to `max_retries + 1` tries. Rate-limit denial is a soft failure:
    /// it consumes no retry, records nothing against the breaker, and hands
    /// control back for failover — unless this is the last candidate, in
    /// which case one bounded wait is spent before a final admission check.
    #[tracing::instrument(
        skip_all,
        fields(provider = %provider.id, tries = provider.max_retries + 1)
    )]
    pub(crate) async fn attempt_provider(
        &self,
        provider: &ProviderDescriptor,
        failsafe: &Failsafe,
        payload: &Value,
        deadline: Instant,
        last_candidate: bool,
    ) -> Result<ProviderSuccess, ProviderError> {
        let mut trail = Vec::new();
        let mut delays = self.retry_policy.schedule();
        let mut last_error: Option<Error> = None;
        let tries = provider.max_retries + 1;

        for attempt in 0..tries {
            let now = now_instant();
            if now >= deadline {
                return Err(ProviderError {
                    error: last_error.unwrap_or(Error::DeadlineExceeded),
                    trail,
                });
            }

            if !failsafe.rate_limiter.admit(now) {
                trail.push(AttemptRecord {
                    provider_id: provider.id.clone(),
                    attempt,
                    latency_ms: 0,
                    status: AttemptStatus::RateLimited,
                });
                if !last_candidate {
                    debug!(provider = %provider.id, "Rate-limited, failing over");
                    return Err(ProviderError {
                        error: Error::ProviderUnavailable(format!("{} is rate-limited", provider.id)),
                        trail,
                    });
                }

                // No other candidate left: one bounded wait, then a final check.
                let wait = self
                    .rate_limit_wait
                    .min(deadline.saturating_duration_since(now));
                debug!(provider = %provider.id, wait_ms = wait.as_millis(), "Rate-limited, sole candidate — waiting");
                sleep(wait).await;
                if !failsafe.rate_limiter.admit(now_instant()) {
                    return Err(ProviderError {
                        error: Error::ProviderUnavailable(format!("{} is rate-limited", provider.id)),
                        trail,
                    });
                }
            }

            let remaining = deadline.saturating_duration_since(now_instant());
            if remaining.is_zero() {
                return Err(ProviderError {
                    error: last_error.unwrap_or(Error::DeadlineExceeded),
                    trail,
                });
            }

            let call_timeout = provider.call_timeout.min(remaining);
            let started = now_instant();
            let result = tokio::time::timeout(
                call_timeout,
                self.transport
                    .call(&provider.endpoint, &provider.credentials_ref, payload, call_timeout),
            )
            .await;
            let latency = now_instant().duration_since(started);

            let error = match result {
                Ok(Ok(response)) => {
                    failsafe.record_success(latency);
                    if latency > provider.sla_target {
                        warn!(
                            provider = %provider.id,
                            latency_ms = latency.as_millis(),
                            sla_target_ms = provider.sla_target.as_millis(),
                            "SLA target breached"
                        );
                    }
                    trail.push(AttemptRecord {
                        provider_id: provider.id.clone(),
                        attempt,
                        latency_ms: latency.as_millis() as u64,
                        status: AttemptStatus::Success,
                    });
                    return Ok(ProviderSuccess { response, trail });
                }
                Ok(Err(error)) => error,
                Err(_elapsed) => Error::ProviderTimeout(provider.id.clone()),
            };

            let kind = error.failure_kind().unwrap_or(FailureKind::Transport);
            failsafe.record_failure(kind, latency, now_instant());
            trail.push(AttemptRecord {
                provider_id: provider.id.clone(),
                attempt,
                latency_ms: latency.as_millis() as u64,
                status: AttemptStatus::Failed(kind),
            });
            debug!(
                provider = %provider.id,
                attempt,
                error = %error,
                latency_ms = latency.as_millis(),
                "Attempt failed"
            );

            let retryable = error.is_retryable();
            last_error = Some(error);
            if !retryable || attempt + 1 == tries {
                break;
            }

            // Backoff before the next try, truncated to the deadline so a
            // near-expiry request never sleeps past its budget.
            if let Some(delay) = delays.next() {
                let delay = delay.min(deadline.saturating_duration_since(now_instant()));
                if !delay.is_zero() {
                    debug!(provider = %provider.id, delay_ms = delay.as_millis(), "Retrying after backoff");
                    sleep(delay).await;
                }
            }
        }

        Err(ProviderError {
            error: last_error.unwrap_or(Error::DeadlineExceeded),
            trail,
        })
    }
}
