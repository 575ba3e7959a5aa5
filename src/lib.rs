//! Thread-safe sliding window rate limiting with hierarchical sub-quotas.
//!
//! A [`Limiter`] admits at most `capacity` operations in any trailing
//! `window`. [`SubLimiter`]s carve tighter caps out of the same ledger, and
//! [`Throttler`] ties a ledger and its named sub-quotas together.

pub mod algorithms;
pub mod config;
pub mod config_validator;
pub mod error;
pub mod metrics;
pub mod quota_plan;
pub mod throttler;

pub use algorithms::{Admission, Limiter, SubLimiter};
pub use config::LimiterConfig;
pub use error::{ThrottlerError, ThrottlerResult};
pub use quota_plan::QuotaPlan;
pub use throttler::{QuotaStatus, Throttler, PARENT_METRICS_KEY};
