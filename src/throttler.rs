use crate::algorithms::{Admission, Limiter, SubLimiter};
use crate::config_validator::ConfigValidator;
use crate::error::ThrottlerResult;
use crate::metrics::MetricsCollector;
use crate::quota_plan::QuotaPlan;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Metrics key for every key that has no sub-quota of its own. Quota names
/// are alphanumeric, so it never collides with one.
pub const PARENT_METRICS_KEY: &str = "*";

/// Shared ledger with named sub-quotas, keyed the way callers think about
/// their traffic. Keys without a sub-quota go straight to the parent ledger.
pub struct Throttler {
    limiter: Arc<Limiter>,
    sub_quotas: HashMap<String, SubLimiter>,
    metrics: MetricsCollector,
}

impl Throttler {
    /// Create a throttler with no sub-quotas
    pub fn new(limiter: Arc<Limiter>) -> Self {
        Self {
            limiter,
            sub_quotas: HashMap::new(),
            metrics: MetricsCollector::new(),
        }
    }

    /// Build the ledger and every sub-quota described by `plan`
    pub fn from_plan(plan: &QuotaPlan) -> ThrottlerResult<Self> {
        plan.validate()?;

        let mut throttler = Self::new(Arc::new(Limiter::from_config(&plan.limiter)?));
        for (name, limit) in &plan.sub_quotas {
            throttler.add_sub_quota(name.clone(), *limit)?;
        }

        info!(
            capacity = plan.limiter.capacity,
            window_ms = plan.limiter.window.as_millis() as u64,
            sub_quotas = throttler.sub_quotas.len(),
            "throttler initialised"
        );
        Ok(throttler)
    }

    /// Add or replace a named sub-quota over the shared ledger
    pub fn add_sub_quota(&mut self, name: String, limit: usize) -> ThrottlerResult<()> {
        ConfigValidator::validate_quota_name(&name)?;
        let sub = SubLimiter::try_new(limit, Arc::clone(&self.limiter))?;
        self.sub_quotas.insert(name, sub);
        Ok(())
    }

    pub fn remove_sub_quota(&mut self, name: &str) -> Option<SubLimiter> {
        self.sub_quotas.remove(name)
    }

    pub fn limiter(&self) -> &Arc<Limiter> {
        &self.limiter
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn quota_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sub_quotas.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Admission source for `key`, falling back to the parent ledger
    pub fn admission(&self, key: &str) -> &dyn Admission {
        match self.sub_quotas.get(key) {
            Some(sub) => sub as &dyn Admission,
            None => self.limiter.as_ref(),
        }
    }

    /// Key the decision for `key` is counted under
    fn metrics_key<'a>(&self, key: &'a str) -> &'a str {
        if self.sub_quotas.contains_key(key) {
            key
        } else {
            PARENT_METRICS_KEY
        }
    }

    /// Admit now if `key` has room, without waiting
    pub fn try_admit(&self, key: &str) -> bool {
        let admitted = self.admission(key).try_admit();

        let metrics_key = self.metrics_key(key);
        if admitted {
            self.metrics.record_admitted(metrics_key);
        } else {
            self.metrics.record_rejected(metrics_key);
        }
        admitted
    }

    fn reserve(&self, key: &str) -> ThrottlerResult<Duration> {
        let metrics_key = self.metrics_key(key);
        match self.admission(key).schedule_bounded() {
            Ok(wait) => {
                self.metrics.record_scheduled(metrics_key, wait);
                debug!(key, wait_ms = wait.as_millis() as u64, "slot reserved");
                Ok(wait)
            }
            Err(err) => {
                self.metrics.record_rejected(metrics_key);
                Err(err)
            }
        }
    }

    /// Wait asynchronously for a slot, bounded by the ledger's max wait.
    ///
    /// Returns how long the caller was held back.
    pub async fn acquire(&self, key: &str) -> ThrottlerResult<Duration> {
        let wait = self.reserve(key)?;
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        Ok(wait)
    }

    /// Blocking counterpart of [`Throttler::acquire`]
    pub fn acquire_blocking(&self, key: &str) -> ThrottlerResult<Duration> {
        let wait = self.reserve(key)?;
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
        Ok(wait)
    }

    /// Current usage as seen through `key`
    pub fn status(&self, key: &str) -> QuotaStatus {
        let limit = match self.sub_quotas.get(key) {
            Some(sub) => sub.effective_limit(),
            None => self.limiter.capacity(),
        };
        let admission = self.admission(key);

        QuotaStatus {
            key: key.to_string(),
            limit,
            in_window: admission.count(),
            wait: admission.peek_wait(),
        }
    }
}

/// Rate limit status information
#[derive(Debug, Clone, Serialize)]
pub struct QuotaStatus {
    pub key: String,
    pub limit: usize,
    pub in_window: usize,
    #[serde(with = "humantime_serde")]
    pub wait: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimiterConfig;
    use crate::error::ThrottlerError;

    fn plan() -> QuotaPlan {
        QuotaPlan::new(LimiterConfig::new(5, Duration::from_secs(1)))
            .with_sub_quota("background", 2)
            .with_sub_quota("search", 4)
    }

    #[test]
    fn test_from_plan_builds_sub_quotas() {
        let throttler = plan().build().unwrap();
        assert_eq!(throttler.quota_names(), vec!["background", "search"]);
        assert_eq!(throttler.limiter().capacity(), 5);
    }

    #[test]
    fn test_sub_quota_limits_its_key_only() {
        let throttler = plan().build().unwrap();

        assert!(throttler.try_admit("background"));
        assert!(throttler.try_admit("background"));
        assert!(!throttler.try_admit("background"));

        // Unknown keys use the parent ledger and its full capacity.
        assert!(throttler.try_admit("interactive"));
        assert!(throttler.try_admit("search"));

        let metrics = throttler.metrics().get("background").unwrap();
        assert_eq!(metrics.admitted, 2);
        assert_eq!(metrics.rejected, 1);
    }

    #[test]
    fn test_status_reports_shared_usage() {
        let throttler = plan().build().unwrap();
        assert!(throttler.try_admit("search"));
        assert!(throttler.try_admit("search"));

        let status = throttler.status("background");
        assert_eq!(status.limit, 2);
        assert_eq!(status.in_window, 2);
        assert!(status.wait > Duration::ZERO);

        let status = throttler.status("anything");
        assert_eq!(status.limit, 5);
        assert_eq!(status.wait, Duration::ZERO);
    }

    #[test]
    fn test_acquire_blocking_respects_max_wait() {
        let limiter = Limiter::new(1, Duration::from_secs(1));
        limiter.set_max_wait(Duration::from_millis(50));
        let throttler = Throttler::new(Arc::new(limiter));

        assert_eq!(throttler.acquire_blocking("api").unwrap(), Duration::ZERO);
        assert!(matches!(
            throttler.acquire_blocking("api"),
            Err(ThrottlerError::WaitLimitExceeded { .. })
        ));
        assert_eq!(throttler.metrics().get(PARENT_METRICS_KEY).unwrap().rejected, 1);
    }

    #[test]
    fn test_acquire_waits_for_slot() {
        let throttler = Throttler::new(Arc::new(Limiter::new(1, Duration::from_millis(50))));

        let waited = tokio_test::block_on(async {
            throttler.acquire("api").await.unwrap();
            throttler.acquire("api").await.unwrap()
        });

        assert!(waited > Duration::ZERO);
        assert!(waited <= Duration::from_millis(50));
        assert_eq!(throttler.metrics().get(PARENT_METRICS_KEY).unwrap().delayed, 1);
    }

    #[test]
    fn test_unknown_keys_share_one_metrics_entry() {
        let throttler = plan().build().unwrap();
        assert!(throttler.try_admit("background"));

        for i in 0..20 {
            throttler.try_admit(&format!("client-{}", i));
        }

        let snapshot = throttler.metrics().snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(throttler.metrics().get("client-3").is_none());

        let parent = &snapshot[PARENT_METRICS_KEY];
        assert_eq!(parent.admitted, 4);
        assert_eq!(parent.rejected, 16);
        assert_eq!(snapshot["background"].admitted, 1);
    }

    #[test]
    fn test_add_sub_quota_rejects_oversized_limit() {
        let mut throttler = Throttler::new(Arc::new(Limiter::new(3, Duration::from_secs(1))));
        assert!(throttler.add_sub_quota("bulk".to_string(), 4).is_err());
        assert!(throttler.add_sub_quota("bulk".to_string(), 3).is_ok());
        assert!(throttler.remove_sub_quota("bulk").is_some());
        assert!(throttler.quota_names().is_empty());
    }
}
