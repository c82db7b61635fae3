//! API tests with mocked collaborators.
//!
//! These tests run the router in-process against a real orchestrator wired
//! to mock source, pipeline and store implementations.

#[macro_use]
mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;
use tempfile::TempDir;

use salebot_core::store::ORCHESTRATOR_ENABLED_KEY;
use salebot_core::SqliteStateStore;

use common::{fixtures, TestFixture};

// =============================================================================
// Basic API Tests
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/health").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
    assert_eq!(response.body["healthy"], false);

    fixture.post("/api/v1/orchestrator/start", json!({})).await;
    let response = fixture.get("/api/v1/health").await;
    assert_eq!(response.body["healthy"], true);
}

#[tokio::test]
async fn test_config_endpoint() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/config").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["server"]["port"], 8080);
    assert_eq!(response.body["orchestrator"]["max_consecutive_errors"], 5);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new();
    fixture.get("/api/v1/health").await;

    let response = fixture.get("/metrics").await;
    assert_status!(response, StatusCode::OK);
    assert!(response.text.contains("salebot_http_requests_total"));
    assert!(response.text.contains("salebot_posting_gate_open"));
}

// =============================================================================
// Orchestrator
// =============================================================================

#[tokio::test]
async fn test_status_when_stopped() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/orchestrator/status").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["available"], true);
    assert_eq!(response.body["running"], false);
    assert_eq!(response.body["consecutive_errors"], 0);
    assert!(response.body["next_run_time"].is_null());
}

#[tokio::test]
async fn test_start_stop_cycle() {
    let fixture = TestFixture::new();

    let response = fixture.post("/api/v1/orchestrator/start", json!({})).await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(
        fixture.store.value(ORCHESTRATOR_ENABLED_KEY).as_deref(),
        Some("true")
    );

    let status = fixture.get("/api/v1/orchestrator/status").await;
    assert_eq!(status.body["running"], true);
    assert!(status.body["next_sales_run_time"].is_string());
    assert!(status.body["next_registration_run_time"].is_string());

    let response = fixture.post("/api/v1/orchestrator/stop", json!({})).await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["stopped"], true);

    let response = fixture.post("/api/v1/orchestrator/stop", json!({})).await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["stopped"], false);
}

#[tokio::test]
async fn test_started_state_survives_restart_on_disk() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("salebot.db");

    {
        let store = SqliteStateStore::new(&db_path).expect("Failed to open store");
        let fixture = TestFixture::with_state_store(Arc::new(store));
        let response = fixture.post("/api/v1/orchestrator/start", json!({})).await;
        assert_status!(response, StatusCode::OK);
        // Dropped without a stop, like a process shutdown.
    }

    let store = SqliteStateStore::new(&db_path).expect("Failed to reopen store");
    let fixture = TestFixture::with_state_store(Arc::new(store));
    let status = fixture.get("/api/v1/orchestrator/status").await;
    assert_eq!(status.body["running"], false);

    fixture
        .orchestrator
        .as_ref()
        .unwrap()
        .initialize_from_store()
        .await;
    let status = fixture.get("/api/v1/orchestrator/status").await;
    assert_eq!(status.body["running"], true);

    // A stop through the API is persisted for the next restart.
    fixture.post("/api/v1/orchestrator/stop", json!({})).await;
    let store = SqliteStateStore::new(&db_path).expect("Failed to reopen store");
    let fixture = TestFixture::with_state_store(Arc::new(store));
    fixture
        .orchestrator
        .as_ref()
        .unwrap()
        .initialize_from_store()
        .await;
    let status = fixture.get("/api/v1/orchestrator/status").await;
    assert_eq!(status.body["running"], false);
}

#[tokio::test]
async fn test_force_stop_and_reset_errors() {
    let fixture = TestFixture::new();
    let orchestrator = fixture.orchestrator.clone().unwrap();

    fixture.post("/api/v1/orchestrator/start", json!({})).await;
    fixture.source.set_failing(Some("feed down")).await;
    orchestrator.run_sales_sync().await;
    orchestrator.run_sales_sync().await;

    let status = fixture.get("/api/v1/orchestrator/status").await;
    assert_eq!(status.body["consecutive_errors"], 2);
    assert_eq!(status.body["last_run_stats"]["kind"], "failure");

    let response = fixture
        .post("/api/v1/orchestrator/force-stop", json!({}))
        .await;
    assert_status!(response, StatusCode::OK);

    let response = fixture
        .post("/api/v1/orchestrator/reset-errors", json!({}))
        .await;
    assert_status!(response, StatusCode::OK);

    let status = fixture.get("/api/v1/orchestrator/status").await;
    assert_eq!(status.body["running"], false);
    assert_eq!(status.body["consecutive_errors"], 0);
}

#[tokio::test]
async fn test_upcoming_runs() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/orchestrator/upcoming").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["sales"], json!([]));

    fixture.post("/api/v1/orchestrator/start", json!({})).await;

    let response = fixture.get("/api/v1/orchestrator/upcoming").await;
    assert_eq!(response.body["sales"].as_array().unwrap().len(), 5);

    let response = fixture.get("/api/v1/orchestrator/upcoming?count=2").await;
    assert_eq!(response.body["sales"].as_array().unwrap().len(), 2);
    assert_eq!(response.body["registrations"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_upcoming_rejects_bad_count() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/orchestrator/upcoming?count=0").await;
    assert_status!(response, StatusCode::BAD_REQUEST);

    let response = fixture.get("/api/v1/orchestrator/upcoming?count=101").await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_manual_sync() {
    let fixture = TestFixture::new();
    fixture
        .source
        .set_batch(fixtures::batch(vec![fixtures::sale("a", 1.0)]))
        .await;

    let response = fixture.post("/api/v1/orchestrator/sync", json!({})).await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["success"], true);
    assert_eq!(response.body["stats"]["sales"]["kind"], "sales");
    assert_eq!(response.body["stats"]["sales"]["new_count"], 1);
    assert!(response.body.get("error").is_none());
    assert_eq!(fixture.pipeline.sales_batches().await.len(), 1);
}

#[tokio::test]
async fn test_manual_sync_failure_in_body() {
    let fixture = TestFixture::new();
    fixture.source.set_failing(Some("feed down")).await;

    let response = fixture.post("/api/v1/orchestrator/sync", json!({})).await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["success"], false);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("feed down"));
}

#[tokio::test]
async fn test_orchestrator_unavailable_without_feed() {
    let fixture = TestFixture::without_orchestrator();

    let status = fixture.get("/api/v1/orchestrator/status").await;
    assert_status!(status, StatusCode::OK);
    assert_eq!(status.body["available"], false);

    for path in [
        "/api/v1/orchestrator/start",
        "/api/v1/orchestrator/stop",
        "/api/v1/orchestrator/sync",
    ] {
        let response = fixture.post(path, json!({})).await;
        assert_status!(response, StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.body["error"].is_string());
    }
}

// =============================================================================
// Posting controls
// =============================================================================

#[tokio::test]
async fn test_posting_gate_roundtrip() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/posting/gate").await;
    assert_eq!(response.body["auto_posting_enabled"], true);

    let response = fixture
        .put(
            "/api/v1/posting/gate",
            json!({ "auto_posting_enabled": false }),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["auto_posting_enabled"], false);
    assert!(!fixture.gate.is_auto_posting_enabled());
}

#[tokio::test]
async fn test_closed_gate_blocks_posting_through_api() {
    let fixture = TestFixture::new();
    fixture
        .source
        .set_batch(fixtures::batch(vec![fixtures::sale("a", 1.0)]))
        .await;
    fixture
        .put(
            "/api/v1/posting/gate",
            json!({ "auto_posting_enabled": false }),
        )
        .await;

    let response = fixture.post("/api/v1/orchestrator/sync", json!({})).await;
    assert_eq!(response.body["success"], true);
    assert_eq!(response.body["stats"]["sales"]["new_count"], 1);
    assert_eq!(response.body["stats"]["sales"]["post_outcomes"], json!([]));
    assert!(fixture.pipeline.sales_batches().await.is_empty());
}

#[tokio::test]
async fn test_posting_settings_update() {
    let fixture = TestFixture::new();

    let response = fixture
        .put(
            "/api/v1/posting/settings",
            json!({
                "enabled": true,
                "registrations_enabled": false,
                "min_sale_price": 0.25
            }),
        )
        .await;
    assert_status!(response, StatusCode::OK);

    let response = fixture.get("/api/v1/posting/settings").await;
    assert_eq!(response.body["enabled"], true);
    assert_eq!(response.body["min_sale_price"], 0.25);
    assert!(fixture.settings.get().await.enabled);
}

#[tokio::test]
async fn test_posting_settings_rejects_negative_price() {
    let fixture = TestFixture::new();

    let response = fixture
        .put(
            "/api/v1/posting/settings",
            json!({ "enabled": true, "min_sale_price": -1.0 }),
        )
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(!fixture.settings.get().await.enabled);
}

#[tokio::test]
async fn test_posting_quota_usage() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/posting/quota").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["used"], 0);
    assert_eq!(response.body["max_posts"], 50);
    assert!(response.body["next_available_in_ms"].is_null());

    fixture.quota.try_acquire().await.unwrap();
    let response = fixture.get("/api/v1/posting/quota").await;
    assert_eq!(response.body["used"], 1);

    let response = fixture.get("/metrics").await;
    assert!(response.text.contains("salebot_posting_quota_used"));
    assert!(response.text.contains("salebot_posting_quota_limit"));
}
