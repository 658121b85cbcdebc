//! Per-provider rolling statistics
//!
//! Feeds both the ranking step (success rate, mean latency) and the
//! reporting surface (p95, error taxonomy, windowed cost accrual). Recording
//! is cheap and never blocks on report generation: reports copy under a
//! short lock and compute outside it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::Serialize;

use crate::error::FailureKind;

/// Latency samples kept per provider for percentile estimation
const LATENCY_SAMPLE_CAPACITY: usize = 100;

/// Per-minute attempt buckets retained for windowed cost reports (24h)
const BUCKET_RETENTION: usize = 24 * 60;

/// Rolling statistics for one provider
pub struct ProviderMetrics {
    /// Total attempts (including retries)
    attempts: AtomicU64,
    /// Total successful attempts
    successes: AtomicU64,
    /// Bounded FIFO of recent latency samples, in milliseconds
    latencies: Mutex<VecDeque<u64>>,
    /// Failure counts by kind
    errors: Mutex<HashMap<FailureKind, u64>>,
    /// Attempt counts bucketed by minute since the epoch, oldest first
    minute_buckets: Mutex<VecDeque<(u64, u64)>>,
}

impl ProviderMetrics {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self {
            attempts: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            latencies: Mutex::new(VecDeque::with_capacity(LATENCY_SAMPLE_CAPACITY)),
            errors: Mutex::new(HashMap::new()),
            minute_buckets: Mutex::new(VecDeque::new()),
        }
    }

    /// Record one attempt outcome
    pub fn record_attempt(&self, success: bool, latency: Duration, error: Option<FailureKind>) {
        self.record_attempt_at(success, latency, error, SystemTime::now());
    }

    /// Record one attempt outcome observed at `at` (injectable for tests)
    pub fn record_attempt_at(
        &self,
        success: bool,
        latency: Duration,
        error: Option<FailureKind>,
        at: SystemTime,
    ) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successes.fetch_add(1, Ordering::Relaxed);
        }

        {
            let mut latencies = self.latencies.lock();
            if latencies.len() >= LATENCY_SAMPLE_CAPACITY {
                latencies.pop_front();
            }
            latencies.push_back(latency.as_millis() as u64);
        }

        if let Some(kind) = error {
            *self.errors.lock().entry(kind).or_insert(0) += 1;
        }

        let minute = minute_of(at);
        let mut buckets = self.minute_buckets.lock();
        match buckets.back_mut() {
            Some((m, count)) if *m == minute => *count += 1,
            _ => {
                buckets.push_back((minute, 1));
                if buckets.len() > BUCKET_RETENTION {
                    buckets.pop_front();
                }
            }
        }
    }

    /// Total attempts so far
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Consistent point-in-time snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let attempts = self.attempts.load(Ordering::Relaxed);
        let successes = self.successes.load(Ordering::Relaxed);

        let samples: Vec<u64> = {
            let latencies = self.latencies.lock();
            latencies.iter().copied().collect()
        };
        let errors_by_kind = self.errors.lock().clone();

        #[allow(clippy::cast_precision_loss)]
        let success_rate = if attempts == 0 {
            // No traffic yet: treated as fully healthy so cold providers
            // are not starved by the ranker.
            1.0
        } else {
            successes as f64 / attempts as f64
        };

        MetricsSnapshot {
            attempts,
            successes,
            success_rate,
            mean_latency_ms: mean(&samples),
            p95_latency_ms: percentile(&samples, 0.95),
            errors_by_kind,
        }
    }

    /// Attempts recorded between `start` and `end` (inclusive, minute
    /// granularity) — the basis for windowed cost reports
    pub fn attempts_between(&self, start: SystemTime, end: SystemTime) -> u64 {
        let (start_min, end_min) = (minute_of(start), minute_of(end));
        self.minute_buckets
            .lock()
            .iter()
            .filter(|(minute, _)| (start_min..=end_min).contains(minute))
            .map(|(_, count)| count)
            .sum()
    }
}

impl Default for ProviderMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn minute_of(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() / 60
}

#[allow(clippy::cast_precision_loss)]
fn mean(samples: &[u64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<u64>() as f64 / samples.len() as f64)
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percentile(samples: &[u64], p: f64) -> Option<u64> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let index = ((sorted.len() as f64) * p).floor() as usize;
    Some(sorted[index.min(sorted.len() - 1)])
}

/// Point-in-time metrics for one provider
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Total attempts (including retries)
    pub attempts: u64,
    /// Total successful attempts
    pub successes: u64,
    /// successes / attempts, defined as 1.0 when attempts = 0
    pub success_rate: f64,
    /// Mean of recent latency samples
    pub mean_latency_ms: Option<f64>,
    /// 95th percentile of recent latency samples
    pub p95_latency_ms: Option<u64>,
    /// Failure counts by kind
    pub errors_by_kind: HashMap<FailureKind, u64>,
}
