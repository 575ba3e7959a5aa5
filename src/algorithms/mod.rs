//! Sliding window admission algorithms
//!
//! This module contains the window ledger ([`Limiter`]) and the sub-quota view
//! ([`SubLimiter`]) layered over it. Both implement [`Admission`], so callers
//! that only need "some rate-limited admission source" can be written against
//! the trait instead of a concrete type.

pub mod sliding_window;
pub mod sub_quota;

pub use sliding_window::Limiter;
pub use sub_quota::SubLimiter;

use crate::error::{ThrottlerError, ThrottlerResult};
use std::thread;
use std::time::Duration;

/// Capability interface shared by every admission source.
pub trait Admission: Send + Sync {
    /// Admit now if the window has room. Never blocks.
    fn try_admit(&self) -> bool;

    /// Reserve the next slot and return how long the caller must wait for it.
    ///
    /// A zero duration means the caller was admitted immediately.
    fn schedule(&self) -> Duration;

    /// Like [`Admission::schedule`], but declines without reserving anything
    /// when the wait would exceed `limit`.
    fn schedule_within(&self, limit: Duration) -> ThrottlerResult<Duration>;

    /// Like [`Admission::schedule_within`] using the ledger's configured max wait.
    /// A zero max wait disables the check.
    fn schedule_bounded(&self) -> ThrottlerResult<Duration>;

    /// The wait that would apply right now, without reserving a slot.
    fn peek_wait(&self) -> Duration;

    /// Number of entries currently in the window, synthetic ones included.
    fn count(&self) -> usize;

    /// Discard every entry in the shared ledger.
    fn clear(&self);

    /// Block the calling thread until a slot is available.
    fn wait(&self) {
        sleep_for(self.schedule());
    }

    /// Block until a slot is available, or fail if that would take longer than `limit`.
    fn wait_within(&self, limit: Duration) -> ThrottlerResult<()> {
        sleep_for(self.schedule_within(limit)?);
        Ok(())
    }

    /// Block until a slot is available, bounded by the configured max wait.
    fn wait_bounded(&self) -> ThrottlerResult<()> {
        sleep_for(self.schedule_bounded()?);
        Ok(())
    }

    /// Reserve a slot now and return a timer that completes when it is usable.
    ///
    /// Must be called from within a Tokio runtime. Dropping the returned
    /// future does not release the reservation.
    fn wait_async(&self) -> tokio::time::Sleep {
        tokio::time::sleep(self.schedule())
    }

    /// Async counterpart of [`Admission::wait_within`].
    fn wait_within_async(&self, limit: Duration) -> ThrottlerResult<tokio::time::Sleep> {
        Ok(tokio::time::sleep(self.schedule_within(limit)?))
    }
}

fn sleep_for(wait: Duration) {
    if !wait.is_zero() {
        thread::sleep(wait);
    }
}

pub(crate) fn check_wait_limit(predicted: Duration, limit: Duration) -> ThrottlerResult<()> {
    if predicted > limit {
        tracing::warn!(
            predicted_ms = predicted.as_millis() as u64,
            limit_ms = limit.as_millis() as u64,
            "declining wait that exceeds limit"
        );
        return Err(ThrottlerError::WaitLimitExceeded { predicted, limit });
    }
    Ok(())
}
