//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `custody_events_total` - Custody events applied (by kind)
//! - `custody_event_noops_total` - Duplicate deliveries absorbed
//! - `custody_commit_duration_seconds` - Commit latencies
//! - `custody_precondition_failures_total` - Commits rejected by guards
//! - `custody_orders_reconciled_total` - Orders reaching RECONCILED
//! - `custody_reconciliation_exceptions_total` - Orders parked in exception

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Events applied, labelled by action kind
    pub events_total: IntCounterVec,

    /// Duplicate deliveries absorbed as no-ops
    pub event_noops_total: IntCounter,

    /// Commit duration histogram
    pub commit_duration: Histogram,

    /// Commits rejected at guard check
    pub precondition_failures_total: IntCounter,

    /// Orders that reached RECONCILED
    pub orders_reconciled_total: IntCounter,

    /// Orders parked in RECONCILIATION_EXCEPTION
    pub reconciliation_exceptions_total: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let events_total = IntCounterVec::new(
            Opts::new("custody_events_total", "Custody events applied"),
            &["kind"],
        )?;
        registry.register(Box::new(events_total.clone()))?;

        let event_noops_total = IntCounter::new(
            "custody_event_noops_total",
            "Duplicate event deliveries absorbed",
        )?;
        registry.register(Box::new(event_noops_total.clone()))?;

        let commit_duration = Histogram::with_opts(
            HistogramOpts::new(
                "custody_commit_duration_seconds",
                "Histogram of commit latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(commit_duration.clone()))?;

        let precondition_failures_total = IntCounter::new(
            "custody_precondition_failures_total",
            "Commits rejected by guard re-check",
        )?;
        registry.register(Box::new(precondition_failures_total.clone()))?;

        let orders_reconciled_total = IntCounter::new(
            "custody_orders_reconciled_total",
            "Orders that reached RECONCILED",
        )?;
        registry.register(Box::new(orders_reconciled_total.clone()))?;

        let reconciliation_exceptions_total = IntCounter::new(
            "custody_reconciliation_exceptions_total",
            "Orders parked in RECONCILIATION_EXCEPTION",
        )?;
        registry.register(Box::new(reconciliation_exceptions_total.clone()))?;

        Ok(Self {
            events_total,
            event_noops_total,
            commit_duration,
            precondition_failures_total,
            orders_reconciled_total,
            reconciliation_exceptions_total,
            registry,
        })
    }

    /// Record an applied event
    pub fn record_event(&self, kind: &str) {
        self.events_total.with_label_values(&[kind]).inc();
    }

    /// Record a duplicate delivery
    pub fn record_noop(&self) {
        self.event_noops_total.inc();
    }

    /// Record commit duration
    pub fn record_commit_duration(&self, duration_seconds: f64) {
        self.commit_duration.observe(duration_seconds);
    }

    /// Record a guard rejection
    pub fn record_precondition_failure(&self) {
        self.precondition_failures_total.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.event_noops_total.get(), 0);
        assert_eq!(metrics.orders_reconciled_total.get(), 0);
    }

    #[test]
    fn test_record_event() {
        let metrics = Metrics::new().unwrap();
        metrics.record_event("RIDER_COLLECTION");
        metrics.record_event("RIDER_COLLECTION");
        metrics.record_event("DEPOSIT");

        assert_eq!(
            metrics
                .events_total
                .with_label_values(&["RIDER_COLLECTION"])
                .get(),
            2
        );
        assert_eq!(metrics.events_total.with_label_values(&["DEPOSIT"]).get(), 1);
    }

    #[test]
    fn test_record_noop_and_failure() {
        let metrics = Metrics::new().unwrap();
        metrics.record_noop();
        metrics.record_precondition_failure();
        assert_eq!(metrics.event_noops_total.get(), 1);
        assert_eq!(metrics.precondition_failures_total.get(), 1);
    }
}
