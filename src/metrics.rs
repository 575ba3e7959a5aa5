use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Admission counters for one quota key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaMetrics {
    /// Admitted without waiting
    pub admitted: u64,
    /// Declined, either by `try_admit` or a bounded wait
    pub rejected: u64,
    /// Admitted after a scheduled wait
    pub delayed: u64,
    #[serde(with = "humantime_serde")]
    pub total_delay: Duration,
}

impl QuotaMetrics {
    pub fn total_requests(&self) -> u64 {
        self.admitted + self.rejected + self.delayed
    }

    fn merge(&mut self, other: &QuotaMetrics) {
        self.admitted += other.admitted;
        self.rejected += other.rejected;
        self.delayed += other.delayed;
        self.total_delay += other.total_delay;
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    quota_metrics: Arc<Mutex<HashMap<String, QuotaMetrics>>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn metrics(&self) -> MutexGuard<'_, HashMap<String, QuotaMetrics>> {
        self.quota_metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_admitted(&self, key: &str) {
        self.metrics().entry(key.to_string()).or_default().admitted += 1;
    }

    pub fn record_rejected(&self, key: &str) {
        self.metrics().entry(key.to_string()).or_default().rejected += 1;
    }

    /// Records a scheduled admission; zero waits count as plain admissions.
    pub fn record_scheduled(&self, key: &str, wait: Duration) {
        let mut metrics = self.metrics();
        let quota_metrics = metrics.entry(key.to_string()).or_default();

        if wait.is_zero() {
            quota_metrics.admitted += 1;
        } else {
            quota_metrics.delayed += 1;
            quota_metrics.total_delay += wait;
        }
    }

    pub fn get(&self, key: &str) -> Option<QuotaMetrics> {
        self.metrics().get(key).cloned()
    }

    pub fn snapshot(&self) -> HashMap<String, QuotaMetrics> {
        self.metrics().clone()
    }

    pub fn reset(&self, key: &str) {
        if let Some(quota_metrics) = self.metrics().get_mut(key) {
            *quota_metrics = QuotaMetrics::default();
        }
    }

    pub fn global(&self) -> QuotaMetrics {
        let metrics = self.metrics();
        let mut global = QuotaMetrics::default();

        for quota_metrics in metrics.values() {
            global.merge(quota_metrics);
        }

        global
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_outcomes_per_key() {
        let collector = MetricsCollector::new();
        collector.record_admitted("search");
        collector.record_rejected("search");
        collector.record_scheduled("search", Duration::from_millis(40));
        collector.record_scheduled("search", Duration::ZERO);

        let search = collector.get("search").unwrap();
        assert_eq!(search.admitted, 2);
        assert_eq!(search.rejected, 1);
        assert_eq!(search.delayed, 1);
        assert_eq!(search.total_delay, Duration::from_millis(40));
        assert_eq!(search.total_requests(), 4);
        assert!(collector.get("other").is_none());
    }

    #[test]
    fn test_global_sums_all_keys() {
        let collector = MetricsCollector::new();
        collector.record_admitted("a");
        collector.record_admitted("b");
        collector.record_scheduled("b", Duration::from_millis(5));

        let global = collector.global();
        assert_eq!(global.admitted, 2);
        assert_eq!(global.delayed, 1);
        assert_eq!(collector.snapshot().len(), 2);
    }

    #[test]
    fn test_reset_clears_one_key() {
        let collector = MetricsCollector::new();
        collector.record_admitted("a");
        collector.record_admitted("b");
        collector.reset("a");

        assert_eq!(collector.get("a"), Some(QuotaMetrics::default()));
        assert_eq!(collector.get("b").unwrap().admitted, 1);
    }
}
