//! Sub-quota views over a shared sliding window ledger
//!
//! A [`SubLimiter`] reserves a smaller slice of its parent's capacity. It owns
//! no timestamps and no lock: every decision is taken on the parent's ledger
//! while holding the parent's mutex, so parent-level and sub-level callers
//! never interleave.

use super::sliding_window::{Ledger, Limiter};
use super::{check_wait_limit, Admission};
use crate::config_validator::ConfigValidator;
use crate::error::ThrottlerResult;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A tighter cap layered over a shared [`Limiter`].
///
/// Admissions through the view are written into the parent's ledger, so they
/// count against the parent's capacity too. The view's limit gates on the
/// *total* number of entries in the ledger: once the parent holds `limit`
/// entries, from any source, the view yields until the window slides.
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use window_throttler::{Admission, Limiter, SubLimiter};
///
/// let parent = Arc::new(Limiter::new(5, Duration::from_secs(1)));
/// let background = SubLimiter::new(2, Arc::clone(&parent));
///
/// assert!(background.try_admit());
/// assert!(background.try_admit());
/// assert!(!background.try_admit());
/// assert!(parent.try_admit());
/// ```
#[derive(Debug, Clone)]
pub struct SubLimiter {
    parent: Arc<Limiter>,
    limit: usize,
}

impl SubLimiter {
    /// Create a view capped at `limit` over `parent`.
    ///
    /// # Panics
    ///
    /// Panics if `limit` exceeds the parent's current capacity.
    pub fn new(limit: usize, parent: Arc<Limiter>) -> Self {
        match Self::try_new(limit, parent) {
            Ok(sub) => sub,
            Err(err) => panic!("{}", err),
        }
    }

    /// Fallible form of [`SubLimiter::new`].
    pub fn try_new(limit: usize, parent: Arc<Limiter>) -> ThrottlerResult<Self> {
        ConfigValidator::validate_sub_limit(limit, parent.capacity())?;
        Ok(Self { parent, limit })
    }

    /// The limit this view was created with.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// The limit actually enforced: never more than the parent's capacity,
    /// even if the parent was shrunk after this view was created.
    pub fn effective_limit(&self) -> usize {
        self.limit.min(self.parent.capacity())
    }

    pub fn parent(&self) -> &Arc<Limiter> {
        &self.parent
    }

    fn gate(&self, ledger: &Ledger) -> usize {
        self.limit.min(ledger.capacity)
    }

    pub(crate) fn try_admit_at(&self, now: Instant) -> bool {
        let mut ledger = self.parent.ledger();
        ledger.evict_expired(now);
        let gate = self.gate(&ledger);
        ledger.admit(now, gate)
    }

    /// Only release the parent's oldest entry when the parent itself is
    /// full. Below that, the reservation takes up spare global capacity and
    /// expires on its own.
    fn reserve(&self, ledger: &mut Ledger, now: Instant) -> Duration {
        let gate = self.gate(ledger);
        let parent_full = ledger.len() >= ledger.capacity;
        ledger.reserve(now, gate, parent_full)
    }

    pub(crate) fn schedule_at(&self, now: Instant) -> Duration {
        let mut ledger = self.parent.ledger();
        ledger.evict_expired(now);
        self.reserve(&mut ledger, now)
    }

    pub(crate) fn schedule_within_at(&self, now: Instant, limit: Option<Duration>) -> ThrottlerResult<Duration> {
        let mut ledger = self.parent.ledger();
        ledger.evict_expired(now);
        let max_wait = ledger.max_wait;

        if let Some(limit) = limit.or_else(|| Some(max_wait).filter(|d| !d.is_zero())) {
            let gate = self.gate(&ledger);
            check_wait_limit(ledger.wait_time(now, gate), limit)?;
        }
        Ok(self.reserve(&mut ledger, now))
    }

    pub(crate) fn peek_wait_at(&self, now: Instant) -> Duration {
        let mut ledger = self.parent.ledger();
        ledger.evict_expired(now);
        let gate = self.gate(&ledger);
        ledger.wait_time(now, gate)
    }
}

impl Admission for SubLimiter {
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
        self.parent.count()
    }

    /// Clears the shared ledger, affecting the parent and every other view.
    fn clear(&self) {
        self.parent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ThrottlerError;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn hierarchy(parent_capacity: usize, limit: usize) -> (Arc<Limiter>, SubLimiter) {
        let parent = Arc::new(Limiter::new(parent_capacity, ms(1000)));
        let sub = SubLimiter::new(limit, Arc::clone(&parent));
        (parent, sub)
    }

    #[test]
    #[should_panic(expected = "sub-limit (6) must not exceed parent limit (5)")]
    fn test_new_panics_when_limit_exceeds_parent() {
        hierarchy(5, 6);
    }

    #[test]
    fn test_try_new_reports_configuration_error() {
        let parent = Arc::new(Limiter::new(5, ms(1000)));
        let err = SubLimiter::try_new(6, parent).unwrap_err();
        assert!(matches!(err, ThrottlerError::Configuration(_)));
    }

    #[test]
    fn test_limit_equal_to_parent_is_allowed() {
        let (_, sub) = hierarchy(5, 5);
        assert_eq!(sub.limit(), 5);
    }

    #[test]
    fn test_try_admit_stops_at_sub_limit() {
        let (parent, sub) = hierarchy(5, 2);
        let t0 = Instant::now();

        assert!(sub.try_admit_at(t0));
        assert!(sub.try_admit_at(t0));
        assert!(!sub.try_admit_at(t0));

        // The parent still has headroom the view cannot touch.
        assert_eq!(parent.count_at(t0), 2);
        assert!(parent.try_admit_at(t0));
    }

    #[test]
    fn test_sub_limit_counts_entries_from_any_source() {
        let (parent, sub) = hierarchy(5, 2);
        let t0 = Instant::now();

        assert!(parent.try_admit_at(t0));
        assert!(parent.try_admit_at(t0));
        assert!(!sub.try_admit_at(t0));
        assert_eq!(sub.peek_wait_at(t0 + ms(300)), ms(700));
    }

    #[test]
    fn test_schedule_below_parent_capacity_grows_ledger() {
        let (parent, sub) = hierarchy(5, 2);
        let t0 = Instant::now();

        assert_eq!(sub.schedule_at(t0), Duration::ZERO);
        assert_eq!(sub.schedule_at(t0 + ms(100)), Duration::ZERO);

        assert_eq!(sub.schedule_at(t0 + ms(200)), ms(800));
        // No entry released: the reservation uses spare global capacity.
        assert_eq!(parent.count_at(t0 + ms(200)), 3);
    }

    #[test]
    fn test_schedule_at_parent_capacity_releases_oldest() {
        let (parent, sub) = hierarchy(3, 2);
        let t0 = Instant::now();

        assert_eq!(sub.schedule_at(t0), Duration::ZERO);
        assert_eq!(sub.schedule_at(t0 + ms(10)), Duration::ZERO);
        assert_eq!(parent.schedule_at(t0 + ms(20)), Duration::ZERO);
        assert_eq!(parent.count_at(t0 + ms(20)), 3);

        assert_eq!(sub.schedule_at(t0 + ms(30)), ms(970));
        assert_eq!(parent.count_at(t0 + ms(30)), 3);

        // The next waiter queues behind the following oldest entry.
        assert_eq!(sub.schedule_at(t0 + ms(30)), ms(980));
    }

    #[test]
    fn test_unreleased_reservation_survives_later_admissions() {
        let (parent, sub) = hierarchy(10, 1);
        let t0 = Instant::now();

        assert!(sub.try_admit_at(t0));
        assert_eq!(sub.schedule_at(t0), ms(1000));
        for offset in [10, 20, 30, 40] {
            assert!(parent.try_admit_at(t0 + ms(offset)));
        }

        // Only the first admission has aged out; the reservation at t0 + 1000
        // is still ahead of the window.
        let later = t0 + ms(1025);
        assert_eq!(parent.count_at(later), 5);
        assert!(parent.ledger().timestamps().contains(&(t0 + ms(1000))));
        assert_eq!(sub.peek_wait_at(later), ms(975));
    }

    #[test]
    fn test_effective_limit_follows_shrunk_parent() {
        let (parent, sub) = hierarchy(5, 4);
        parent.set_capacity(2);
        assert_eq!(sub.effective_limit(), 2);

        let t0 = Instant::now();
        assert!(sub.try_admit_at(t0));
        assert!(sub.try_admit_at(t0));
        assert!(!sub.try_admit_at(t0));
    }

    #[test]
    fn test_schedule_within_checks_sub_gate() {
        let (parent, sub) = hierarchy(5, 1);
        let t0 = Instant::now();
        assert!(sub.try_admit_at(t0));

        assert!(sub.schedule_within_at(t0 + ms(100), Some(ms(500))).is_err());
        assert_eq!(parent.count_at(t0 + ms(100)), 1);
        assert_eq!(sub.schedule_within_at(t0 + ms(600), Some(ms(500))).unwrap(), ms(400));
    }

    #[test]
    fn test_schedule_bounded_uses_parent_max_wait() {
        let (parent, sub) = hierarchy(5, 1);
        parent.set_max_wait(ms(100));
        let t0 = Instant::now();
        assert!(sub.try_admit_at(t0));

        assert!(sub.schedule_within_at(t0, None).is_err());
        assert_eq!(sub.schedule_within_at(t0 + ms(950), None).unwrap(), ms(50));
    }

    #[test]
    fn test_count_and_clear_are_shared() {
        let (parent, sub) = hierarchy(5, 3);
        let other = SubLimiter::new(2, Arc::clone(&parent));

        assert!(sub.try_admit());
        assert!(other.try_admit());
        assert_eq!(sub.count(), 2);
        assert_eq!(other.count(), parent.count());

        other.clear();
        assert_eq!(parent.count(), 0);
        assert_eq!(sub.peek_wait(), Duration::ZERO);
    }
}
