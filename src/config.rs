use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use validator::{Validate, ValidationError};

use crate::error::{ThrottlerError, ThrottlerResult};

/// Settings for a single sliding window ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct LimiterConfig {
    /// Maximum admissions per window
    #[validate(range(min = 1, message = "capacity must be greater than 0"))]
    pub capacity: usize,

    /// Length of the trailing window
    #[serde(with = "humantime_serde")]
    #[validate(custom(function = validate_non_zero_duration))]
    pub window: Duration,

    /// Ceiling for bounded waits, zero disables it
    #[serde(default, with = "humantime_serde")]
    pub max_wait: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            window: Duration::from_secs(1),
            max_wait: Duration::ZERO,
        }
    }
}

impl LimiterConfig {
    pub fn new(capacity: usize, window: Duration) -> Self {
        Self {
            capacity,
            window,
            max_wait: Duration::ZERO,
        }
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Load configuration from environment variables
    ///
    /// Reads `THROTTLE_CAPACITY`, `THROTTLE_WINDOW` and `THROTTLE_MAX_WAIT`;
    /// durations use humantime syntax (`"1s"`, `"250ms"`). Missing variables
    /// keep their defaults.
    pub fn from_env() -> ThrottlerResult<Self> {
        let defaults = Self::default();

        let capacity = match env::var("THROTTLE_CAPACITY") {
            Ok(raw) => raw.trim().parse().map_err(|_| {
                ThrottlerError::Configuration(format!("THROTTLE_CAPACITY is not a number: {}", raw))
            })?,
            Err(_) => defaults.capacity,
        };

        let config = Self {
            capacity,
            window: duration_var("THROTTLE_WINDOW")?.unwrap_or(defaults.window),
            max_wait: duration_var("THROTTLE_MAX_WAIT")?.unwrap_or(defaults.max_wait),
        };
        config.validate()?;
        Ok(config)
    }
}

fn duration_var(name: &str) -> ThrottlerResult<Option<Duration>> {
    match env::var(name) {
        Ok(raw) => parse_duration(&raw)
            .map(Some)
            .map_err(|e| ThrottlerError::Configuration(format!("{} is not a duration: {}", name, e))),
        Err(_) => Ok(None),
    }
}

/// Parse a humantime duration such as `"1s"` or `"1m 30s"`.
pub fn parse_duration(raw: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(raw.trim())
}

fn validate_non_zero_duration(value: &Duration) -> Result<(), ValidationError> {
    if value.is_zero() {
        let mut err = ValidationError::new("non_zero_duration");
        err.message = Some("window must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}
