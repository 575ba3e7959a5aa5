use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::config::LimiterConfig;
use crate::config_validator::ConfigValidator;
use crate::error::ThrottlerResult;
use crate::throttler::Throttler;

/// A parent ledger plus the named sub-quotas carved out of it.
///
/// ```json
/// {
///   "limiter": { "capacity": 100, "window": "1m", "max_wait": "5s" },
///   "sub_quotas": { "background": 20, "search": 50 }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaPlan {
    pub limiter: LimiterConfig,
    #[serde(default)]
    pub sub_quotas: BTreeMap<String, usize>,
}

impl QuotaPlan {
    pub fn new(limiter: LimiterConfig) -> Self {
        Self {
            limiter,
            sub_quotas: BTreeMap::new(),
        }
    }

    /// Add or replace a sub-quota
    pub fn with_sub_quota(mut self, name: impl Into<String>, limit: usize) -> Self {
        self.sub_quotas.insert(name.into(), limit);
        self
    }

    /// Check the ledger settings and that every sub-quota fits inside it
    pub fn validate(&self) -> ThrottlerResult<()> {
        ConfigValidator::validate_limiter(&self.limiter)?;

        for (name, limit) in &self.sub_quotas {
            ConfigValidator::validate_quota_name(name)?;
            ConfigValidator::validate_sub_limit(*limit, self.limiter.capacity)?;
        }

        Ok(())
    }

    pub fn from_json_str(raw: &str) -> ThrottlerResult<Self> {
        let plan: QuotaPlan = serde_json::from_str(raw)?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> ThrottlerResult<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn build(&self) -> ThrottlerResult<Throttler> {
        Throttler::from_plan(self)
    }
}
