//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the salebot server:
//! - HTTP request metrics (latency, counts)
//! - Posting gate state and quota usage (collected dynamically)
//! - Core orchestrator and posting metrics, re-registered from `salebot_core`

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "salebot_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("salebot_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "salebot_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Posting Metrics
// =============================================================================

/// Whether the global auto-posting gate is open (1) or closed (0).
pub static POSTING_GATE_OPEN: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "salebot_posting_gate_open",
        "Whether automated posting is permitted",
    )
    .unwrap()
});

/// Posts counted against the quota in the current window.
pub static POSTING_QUOTA_USED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "salebot_posting_quota_used",
        "Posts made within the current quota window",
    )
    .unwrap()
});

/// Maximum posts allowed per quota window.
pub static POSTING_QUOTA_LIMIT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "salebot_posting_quota_limit",
        "Maximum posts allowed per quota window",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Posting
    registry
        .register(Box::new(POSTING_GATE_OPEN.clone()))
        .unwrap();
    registry
        .register(Box::new(POSTING_QUOTA_USED.clone()))
        .unwrap();
    registry
        .register(Box::new(POSTING_QUOTA_LIMIT.clone()))
        .unwrap();

    // Core metrics (orchestrator, posting outcomes)
    for metric in salebot_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so gauges reflect the current values even when no
/// run has happened since the last change.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    POSTING_GATE_OPEN.set(i64::from(state.gate().is_auto_posting_enabled()));

    let quota = state.quota().status().await;
    POSTING_QUOTA_USED.set(i64::from(quota.used));
    POSTING_QUOTA_LIMIT.set(i64::from(quota.max_posts));

    if let Some(orchestrator) = state.orchestrator() {
        let status = orchestrator.status().await;
        salebot_core::metrics::ORCHESTRATOR_RUNNING.set(i64::from(status.running));
        salebot_core::metrics::CONSECUTIVE_ERRORS.set(i64::from(status.consecutive_errors));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        // Access metrics to ensure they're initialized
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("salebot_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_core_metrics() {
        // Prometheus only outputs vector metrics that have been accessed
        salebot_core::metrics::SYNC_RUNS
            .with_label_values(&["sales", "success"])
            .inc_by(0);
        salebot_core::metrics::SKIPPED_FIRES
            .with_label_values(&["sales", "in_flight"])
            .inc_by(0);
        POSTING_GATE_OPEN.set(0);

        let output = encode_metrics();

        assert!(output.contains("salebot_posting_gate_open"));
        assert!(output.contains("salebot_posting_quota_used"));
        assert!(output.contains("salebot_posting_quota_limit"));
        assert!(output.contains("salebot_sync_runs_total"));
        assert!(output.contains("salebot_skipped_fires_total"));
        assert!(output.contains("salebot_consecutive_errors"));
        assert!(output.contains("salebot_orchestrator_running"));
        assert!(output.contains("salebot_trip_wire_stops_total"));
    }
}
