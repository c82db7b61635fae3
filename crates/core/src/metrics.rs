//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Orchestrator (runs, skipped fires, trip-wire)
//! - Posting (outcomes per task)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Orchestrator Metrics
// =============================================================================

/// Sync runs total by task and result.
pub static SYNC_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("salebot_sync_runs_total", "Total sync runs"),
        &["task", "result"], // "sales"/"registrations", "success"/"failure"
    )
    .unwrap()
});

/// Sync run duration in seconds.
pub static SYNC_RUN_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("salebot_sync_run_duration_seconds", "Duration of sync runs")
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["task"],
    )
    .unwrap()
});

/// Scheduled fires that did no work.
pub static SKIPPED_FIRES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "salebot_skipped_fires_total",
            "Scheduled fires skipped without running",
        ),
        &["task", "reason"], // "not_running", "in_flight"
    )
    .unwrap()
});

/// Current consecutive sales failure count.
pub static CONSECUTIVE_ERRORS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "salebot_consecutive_errors",
        "Consecutive failed sales runs",
    )
    .unwrap()
});

/// Whether the orchestrator is running (1) or stopped (0).
pub static ORCHESTRATOR_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "salebot_orchestrator_running",
        "Whether the sync orchestrator is running",
    )
    .unwrap()
});

/// Automatic stops caused by the consecutive-error trip-wire.
pub static TRIP_WIRE_STOPS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "salebot_trip_wire_stops_total",
        "Orchestrator stops triggered by consecutive sales failures",
    )
    .unwrap()
});

// =============================================================================
// Posting Metrics
// =============================================================================

/// Post outcomes by task and outcome.
pub static POST_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("salebot_post_outcomes_total", "Post outcomes"),
        &["task", "outcome"], // "posted", "skipped", "failed"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(SYNC_RUNS.clone()),
        Box::new(SYNC_RUN_DURATION.clone()),
        Box::new(SKIPPED_FIRES.clone()),
        Box::new(CONSECUTIVE_ERRORS.clone()),
        Box::new(ORCHESTRATOR_RUNNING.clone()),
        Box::new(TRIP_WIRE_STOPS.clone()),
        Box::new(POST_OUTCOMES.clone()),
    ]
}

/// Record the outcome tally of one run.
pub fn record_post_tally(task: &str, tally: &crate::posting::OutcomeTally) {
    POST_OUTCOMES
        .with_label_values(&[task, "posted"])
        .inc_by(tally.posted as u64);
    POST_OUTCOMES
        .with_label_values(&[task, "skipped"])
        .inc_by(tally.skipped as u64);
    POST_OUTCOMES
        .with_label_values(&[task, "failed"])
        .inc_by(tally.failed as u64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posting::OutcomeTally;
    use prometheus::Registry;

    #[test]
    fn test_all_metrics_register() {
        let registry = Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
        SYNC_RUNS.with_label_values(&["sales", "success"]).inc();
        assert!(!registry.gather().is_empty());
    }

    #[test]
    fn test_record_post_tally() {
        let before = POST_OUTCOMES.with_label_values(&["test", "posted"]).get();
        record_post_tally(
            "test",
            &OutcomeTally {
                posted: 2,
                skipped: 1,
                failed: 0,
            },
        );
        let after = POST_OUTCOMES.with_label_values(&["test", "posted"]).get();
        assert_eq!(after - before, 2);
    }
}
