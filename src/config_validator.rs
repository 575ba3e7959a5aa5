use crate::config::LimiterConfig;
use crate::error::{ThrottlerError, ThrottlerResult};
use validator::Validate;

/// Validates configuration objects for consistency and correctness
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates a single ledger's settings
    pub fn validate_limiter(config: &LimiterConfig) -> ThrottlerResult<()> {
        config.validate()?;
        Ok(())
    }

    /// Validates that a sub-quota fits inside its parent
    pub fn validate_sub_limit(limit: usize, parent_capacity: usize) -> ThrottlerResult<()> {
        if limit > parent_capacity {
            return Err(ThrottlerError::Configuration(format!(
                "sub-limit ({}) must not exceed parent limit ({})",
                limit, parent_capacity
            )));
        }

        Ok(())
    }

    /// Validates a sub-quota name (alphanumeric, hyphens, underscores)
    pub fn validate_quota_name(name: &str) -> ThrottlerResult<()> {
        if name.trim().is_empty() {
            return Err(ThrottlerError::Configuration(
                "Quota name cannot be empty".to_string(),
            ));
        }

        if !name.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
            return Err(ThrottlerError::Configuration(format!(
                "Quota name '{}' can only contain alphanumeric characters, hyphens, and underscores",
                name
            )));
        }

        Ok(())
    }
}
