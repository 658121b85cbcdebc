//! Circuit breaker implementation

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::BreakerConfig;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed (allowing requests)
    Closed,
    /// Circuit is open (blocking requests)
    Open,
    /// Circuit is half-open (allowing limited probe requests)
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Mutable breaker state, guarded as one unit so the threshold invariant
/// stays exact under concurrent attempts against the same provider.
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    last_failure: Option<Instant>,
    open_until: Option<Instant>,
    /// Recent failure instants for the burst trigger, bounded by the
    /// burst threshold — once full it is already enough to open.
    recent_failures: VecDeque<Instant>,
}

/// Circuit breaker for provider protection
///
/// Dual opening trigger: a run of consecutive failures, or a burst of
/// failures within a trailing window even when successes interleave.
/// A failure while half-open reopens immediately with a fresh cool-down.
pub struct CircuitBreaker {
    /// Provider id, for logs
    name: String,
    failure_threshold: u32,
    success_threshold: u32,
    cool_down: Duration,
    burst_threshold: u32,
    burst_window: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    #[must_use]
    pub fn new(name: &str, config: &BreakerConfig) -> Self {
        Self {
            name: name.to_string(),
            failure_threshold: config.failure_threshold,
            success_threshold: config.success_threshold,
            cool_down: config.cool_down,
            burst_threshold: config.burst_threshold,
            burst_window: config.burst_window,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                last_failure: None,
                open_until: None,
                recent_failures: VecDeque::with_capacity(config.burst_threshold as usize),
            }),
        }
    }

    /// Check whether a call may be attempted at `now`.
    ///
    /// Performs the lazy Open → HalfOpen transition as a side effect: the
    /// first check at or past the cool-down deadline flips the breaker into
    /// half-open and admits the probe.
    pub fn is_available(&self, now: Instant) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let eligible = inner.open_until.is_some_and(|until| now >= until);
                if eligible {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    debug!(provider = %self.name, "Cool-down elapsed, circuit half-open");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.half_open_successes = 0;
                    inner.open_until = None;
                    inner.recent_failures.clear();
                    info!(provider = %self.name, "Circuit breaker closed");
                }
            }
            CircuitState::Open => {
                // In-flight call finished after the breaker opened; ignore.
            }
        }
    }

    /// Record a failed call observed at `now`
    pub fn record_failure(&self, now: Instant) {
        let mut inner = self.inner.lock();
        inner.last_failure = Some(now);

        // Burst bookkeeping: keep only failures inside the trailing window.
        while inner
            .recent_failures
            .front()
            .is_some_and(|&t| now.duration_since(t) >= self.burst_window)
        {
            inner.recent_failures.pop_front();
        }
        inner.recent_failures.push_back(now);
        if inner.recent_failures.len() > self.burst_threshold as usize {
            inner.recent_failures.pop_front();
        }

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                let burst = inner.recent_failures.len() as u32 >= self.burst_threshold;
                if inner.consecutive_failures >= self.failure_threshold || burst {
                    self.open(&mut inner, now, if burst { "burst" } else { "consecutive" });
                }
            }
            CircuitState::HalfOpen => {
                // A probe failed: reopen immediately with a fresh cool-down.
                warn!(provider = %self.name, "Probe failed while half-open, reopening circuit");
                self.open(&mut inner, now, "half-open probe");
            }
            CircuitState::Open => {
                // In-flight call finished after the breaker opened; ignore.
            }
        }
    }

    fn open(&self, inner: &mut BreakerInner, now: Instant, trigger: &str) {
        inner.state = CircuitState::Open;
        inner.open_until = Some(now + self.cool_down);
        inner.half_open_successes = 0;
        warn!(
            provider = %self.name,
            trigger,
            consecutive_failures = inner.consecutive_failures,
            cool_down_secs = self.cool_down.as_secs(),
            "Circuit breaker opened"
        );
    }

    /// Current state (no side effects)
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Snapshot for health reporting
    pub fn snapshot(&self, now: Instant) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            seconds_until_probe: inner
                .open_until
                .filter(|_| inner.state == CircuitState::Open)
                .map(|until| until.saturating_duration_since(now).as_secs()),
        }
    }
}

/// Point-in-time breaker state for health reports
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    /// Current state
    pub state: CircuitState,
    /// Consecutive failure count
    pub consecutive_failures: u32,
    /// Seconds until an open breaker admits a probe, when open
    pub seconds_until_probe: Option<u64>,
}
