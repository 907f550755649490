use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::ports::{MetricsPort, RetryPhase};

#[derive(Clone, Debug, Default)]
pub struct NullMetrics;

impl MetricsPort for NullMetrics {
    fn record_ok(&self, _latency_ms: u64) {}
    fn record_fail(&self, _kind: &str) {}
    fn record_scroll(&self) {}
    fn record_retry(&self, _phase: RetryPhase) {}
}

/// Process-local counters.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    ok: AtomicU64,
    latency_ms_total: AtomicU64,
    scrolls: AtomicU64,
    actionability_retries: AtomicU64,
    assertion_retries: AtomicU64,
    failures: Mutex<BTreeMap<String, u64>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub ok: u64,
    pub latency_ms_total: u64,
    pub scrolls: u64,
    pub actionability_retries: u64,
    pub assertion_retries: u64,
    pub failures: BTreeMap<String, u64>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ok: self.ok.load(Ordering::Relaxed),
            latency_ms_total: self.latency_ms_total.load(Ordering::Relaxed),
            scrolls: self.scrolls.load(Ordering::Relaxed),
            actionability_retries: self.actionability_retries.load(Ordering::Relaxed),
            assertion_retries: self.assertion_retries.load(Ordering::Relaxed),
            failures: self.failures.lock().clone(),
        }
    }
}

impl MetricsPort for InMemoryMetrics {
    fn record_ok(&self, latency_ms: u64) {
        self.ok.fetch_add(1, Ordering::Relaxed);
        self.latency_ms_total.fetch_add(latency_ms, Ordering::Relaxed);
    }

    fn record_fail(&self, kind: &str) {
        *self.failures.lock().entry(kind.to_string()).or_default() += 1;
    }

    fn record_scroll(&self) {
        self.scrolls.fetch_add(1, Ordering::Relaxed);
    }

    fn record_retry(&self, phase: RetryPhase) {
        let counter = match phase {
            RetryPhase::Actionability => &self.actionability_retries,
            RetryPhase::Assertions => &self.assertion_retries,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = InMemoryMetrics::new();
        metrics.record_ok(12);
        metrics.record_ok(8);
        metrics.record_fail("not_visible");
        metrics.record_fail("not_visible");
        metrics.record_retry(RetryPhase::Actionability);
        metrics.record_scroll();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.ok, 2);
        assert_eq!(snapshot.latency_ms_total, 20);
        assert_eq!(snapshot.failures["not_visible"], 2);
        assert_eq!(snapshot.actionability_retries, 1);
        assert_eq!(snapshot.assertion_retries, 0);
        assert_eq!(snapshot.scrolls, 1);
    }
}
