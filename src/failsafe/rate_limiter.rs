//! Per-provider sliding-window admission control

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Trailing window length for all providers
pub const WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window rate limiter
///
/// Admits at most `limit` calls within any trailing 60-second window. The
/// ring of admission instants is bounded by `limit`, and expired entries are
/// evicted on every check — no sweeper task, no unbounded growth. Denial has
/// no side effect and never blocks; the caller decides whether to fail over
/// or wait.
pub struct RateLimiter {
    limit: usize,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter admitting `limit` calls per trailing window
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit as usize,
            admitted: Mutex::new(VecDeque::with_capacity(limit as usize)),
        }
    }

    /// Try to admit a call at `now`; records the call when admitted
    pub fn admit(&self, now: Instant) -> bool {
        let mut admitted = self.admitted.lock();
        while admitted
            .front()
            .is_some_and(|&t| now.duration_since(t) >= WINDOW)
        {
            admitted.pop_front();
        }
        if admitted.len() < self.limit {
            admitted.push_back(now);
            true
        } else {
            false
        }
    }

    /// Calls currently counted against the window at `now`
    pub fn in_flight(&self, now: Instant) -> usize {
        let mut admitted = self.admitted.lock();
        while admitted
            .front()
            .is_some_and(|&t| now.duration_since(t) >= WINDOW)
        {
            admitted.pop_front();
        }
        admitted.len()
    }
}
