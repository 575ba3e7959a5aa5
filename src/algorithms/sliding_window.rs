//! Sliding window rate limiting algorithm
//!
//! Keeps one timestamp per admitted (or reserved) request and counts how many
//! of them fall inside the trailing window.

use super::{check_wait_limit, Admission};
use crate::config::LimiterConfig;
use crate::config_validator::ConfigValidator;
use crate::error::ThrottlerResult;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Timestamp ledger and its configuration. Only ever touched under the
/// owning [`Limiter`]'s lock.
#[derive(Debug)]
pub(crate) struct Ledger {
    /// Roughly ordered. A sub-quota reservation that releases nothing leaves a
    /// future entry ahead of later admissions, so only the front is trusted.
    timestamps: VecDeque<Instant>,
    pub(crate) capacity: usize,
    pub(crate) window: Duration,
    pub(crate) max_wait: Duration,
}

impl Ledger {
    fn new(capacity: usize, window: Duration, max_wait: Duration) -> Self {
        Self {
            timestamps: VecDeque::new(),
            capacity,
            window,
            max_wait,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Pop expired entries off the front, stopping at the first live one.
    pub(crate) fn evict_expired(&mut self, now: Instant) {
        let mut evicted = 0;
        while let Some(&front) = self.timestamps.front() {
            if now.saturating_duration_since(front) > self.window {
                self.timestamps.pop_front();
                evicted += 1;
            } else {
                break;
            }
        }

        if evicted > 0 {
            trace!(evicted, remaining = self.timestamps.len(), "evicted expired timestamps");
        }
    }

    /// Instant at which the oldest entry leaves the window.
    fn next_free_at(&self, now: Instant) -> Instant {
        let oldest = self.timestamps.front().copied().unwrap_or(now);
        oldest.checked_add(self.window).unwrap_or(oldest)
    }

    /// Wait imposed by `limit`, zero if the ledger is below it.
    pub(crate) fn wait_time(&self, now: Instant, limit: usize) -> Duration {
        if self.len() < limit {
            return Duration::ZERO;
        }
        self.next_free_at(now).saturating_duration_since(now)
    }

    pub(crate) fn admit(&mut self, now: Instant, limit: usize) -> bool {
        if self.len() >= limit {
            return false;
        }
        self.timestamps.push_back(now);
        true
    }

    /// Admit now if below `limit`, otherwise book the instant the oldest entry
    /// frees up. `release_oldest` drops that oldest entry so the next caller
    /// queues behind this reservation instead of sharing it.
    pub(crate) fn reserve(&mut self, now: Instant, limit: usize, release_oldest: bool) -> Duration {
        if self.admit(now, limit) {
            return Duration::ZERO;
        }

        let free_at = self.next_free_at(now);
        let wait = free_at.saturating_duration_since(now);

        self.timestamps.push_back(free_at);
        if release_oldest {
            self.timestamps.pop_front();
        }

        debug!(
            wait_ms = wait.as_millis() as u64,
            queued = self.timestamps.len(),
            released = release_oldest,
            "reserved future slot"
        );
        wait
    }

    pub(crate) fn clear(&mut self) {
        self.timestamps.clear();
    }

    #[cfg(test)]
    pub(crate) fn timestamps(&self) -> Vec<Instant> {
        self.timestamps.iter().copied().collect()
    }
}

/// Sliding window rate limiter.
///
/// Allows at most `capacity` admissions in any trailing `window`. All state
/// lives behind one mutex, which [`SubLimiter`](super::SubLimiter)s share.
///
/// ```
/// use std::time::Duration;
/// use window_throttler::{Admission, Limiter};
///
/// let limiter = Limiter::new(2, Duration::from_secs(1));
/// assert!(limiter.try_admit());
/// assert!(limiter.try_admit());
/// assert!(!limiter.try_admit());
/// assert!(limiter.peek_wait() > Duration::ZERO);
/// ```
#[derive(Debug)]
pub struct Limiter {
    ledger: Mutex<Ledger>,
}

impl Limiter {
    /// Create a limiter allowing `capacity` admissions per `window`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize, window: Duration) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");

        Self {
            ledger: Mutex::new(Ledger::new(capacity, window, Duration::ZERO)),
        }
    }

    /// Create a limiter from validated configuration.
    pub fn from_config(config: &LimiterConfig) -> ThrottlerResult<Self> {
        ConfigValidator::validate_limiter(config)?;

        Ok(Self {
            ledger: Mutex::new(Ledger::new(config.capacity, config.window, config.max_wait)),
        })
    }

    /// Lock the ledger. A panic while holding the lock cannot leave the
    /// ledger half-updated, so poisoning is ignored.
    pub(crate) fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.ledger().capacity
    }

    /// Takes effect on the next operation. Shrinking never revokes entries
    /// already admitted; they simply keep the ledger full until they expire.
    pub fn set_capacity(&self, capacity: usize) {
        self.ledger().capacity = capacity;
        info!(capacity, "limiter capacity updated");
    }

    pub fn window(&self) -> Duration {
        self.ledger().window
    }

    pub fn set_window(&self, window: Duration) {
        self.ledger().window = window;
        info!(window_ms = window.as_millis() as u64, "limiter window updated");
    }

    /// Ceiling used by the bounded operations. Zero disables the check.
    pub fn max_wait(&self) -> Duration {
        self.ledger().max_wait
    }

    pub fn set_max_wait(&self, max_wait: Duration) {
        self.ledger().max_wait = max_wait;
        info!(max_wait_ms = max_wait.as_millis() as u64, "limiter max wait updated");
    }

    pub(crate) fn try_admit_at(&self, now: Instant) -> bool {
        let mut ledger = self.ledger();
        ledger.evict_expired(now);
        let capacity = ledger.capacity;
        ledger.admit(now, capacity)
    }

    pub(crate) fn schedule_at(&self, now: Instant) -> Duration {
        let mut ledger = self.ledger();
        ledger.evict_expired(now);
        let capacity = ledger.capacity;
        ledger.reserve(now, capacity, true)
    }

    pub(crate) fn schedule_within_at(&self, now: Instant, limit: Option<Duration>) -> ThrottlerResult<Duration> {
        let mut ledger = self.ledger();
        ledger.evict_expired(now);
        let capacity = ledger.capacity;
        let max_wait = ledger.max_wait;

        if let Some(limit) = limit.or_else(|| Some(max_wait).filter(|d| !d.is_zero())) {
            check_wait_limit(ledger.wait_time(now, capacity), limit)?;
        }
        Ok(ledger.reserve(now, capacity, true))
    }

    pub(crate) fn peek_wait_at(&self, now: Instant) -> Duration {
        let mut ledger = self.ledger();
        ledger.evict_expired(now);
        let capacity = ledger.capacity;
        ledger.wait_time(now, capacity)
    }

    pub(crate) fn count_at(&self, now: Instant) -> usize {
        let mut ledger = self.ledger();
        ledger.evict_expired(now);
        ledger.len()
    }
}

impl Admission for Limiter {
    fn try_admit(&self) -> bool {
        self.try_admit_at(Instant::now())
    }

    fn schedule(&self) -> Duration {
        self.schedule_at(Instant::now())
    }

    fn schedule_within(&self, limit: Duration) -> ThrottlerResult<Duration> {
        self.schedule_within_at(Instant::now(), Some(limit))
    }

    fn schedule_bounded(&self) -> ThrottlerResult<Duration> {
        self.schedule_within_at(Instant::now(), None)
    }

    fn peek_wait(&self) -> Duration {
        self.peek_wait_at(Instant::now())
    }

    fn count(&self) -> usize {
        self.count_at(Instant::now())
    }

    fn clear(&self) {
        self.ledger().clear();
    }
}
