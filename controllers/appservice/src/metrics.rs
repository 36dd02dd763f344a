//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `appservice_reconciliations_total` - Total number of reconciliation passes
//! - `appservice_reconciliation_errors_total` - Total number of passes ending in error
//! - `appservice_reconciliation_duration_seconds` - Duration of reconciliation passes
//! - `appservice_managed_resource_operations_total` - Creates and patches of managed resources, by kind and verb
//! - `appservice_migration_runs_total` - Database script runs, by result

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "appservice_reconciliations_total",
        "Total number of reconciliation passes",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "appservice_reconciliation_errors_total",
        "Total number of reconciliation passes ending in error",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "appservice_reconciliation_duration_seconds",
            "Duration of reconciliation passes in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static MANAGED_RESOURCE_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "appservice_managed_resource_operations_total",
            "Total number of managed resource writes by kind and verb",
        ),
        &["kind", "verb"],
    )
    .expect("Failed to create MANAGED_RESOURCE_OPERATIONS_TOTAL metric - this should never happen")
});

static MIGRATION_RUNS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "appservice_migration_runs_total",
            "Total number of database script runs by result",
        ),
        &["result"],
    )
    .expect("Failed to create MIGRATION_RUNS_TOTAL metric - this should never happen")
});

pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(MANAGED_RESOURCE_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(MIGRATION_RUNS_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_managed_resource_operations(kind: &str, verb: &str) {
    MANAGED_RESOURCE_OPERATIONS_TOTAL.with_label_values(&[kind, verb]).inc();
}

pub fn increment_migration_runs(result: &str) {
    MIGRATION_RUNS_TOTAL.with_label_values(&[result]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labelled_counters_accumulate() {
        let before = MANAGED_RESOURCE_OPERATIONS_TOTAL
            .with_label_values(&["Secret", "created"])
            .get();
        increment_managed_resource_operations("Secret", "created");
        increment_managed_resource_operations("Secret", "created");
        let after = MANAGED_RESOURCE_OPERATIONS_TOTAL
            .with_label_values(&["Secret", "created"])
            .get();
        assert_eq!(after - before, 2);
    }
}
