//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process router
//! with mock collaborators injected behind a real orchestrator.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use salebot_core::{
    posting::QuotaConfig,
    testing::{MockPostingPipeline, MockSourceProcessor, MockStateStore},
    Config, OrchestratorConfig, PostingGate, PostingSettings, QuotaHandle, SettingsHandle,
    StateStore, SyncOrchestrator,
};
use salebot_server::state::AppState;

/// Re-export fixtures for test convenience
pub use salebot_core::testing::fixtures;

/// Test fixture for API testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_start() {
///     let fixture = TestFixture::new();
///     let response = fixture.post("/api/v1/orchestrator/start", json!({})).await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub orchestrator: Option<SyncOrchestrator>,
    pub source: MockSourceProcessor,
    pub pipeline: MockPostingPipeline,
    /// Store behind the orchestrator, unless one was passed to
    /// [`TestFixture::with_state_store`].
    pub store: MockStateStore,
    pub gate: PostingGate,
    pub settings: SettingsHandle,
    pub quota: QuotaHandle,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

impl TestFixture {
    /// Fixture with an orchestrator whose schedules do not fire during tests.
    pub fn new() -> Self {
        let store = MockStateStore::new();
        Self::build(true, store.clone(), Arc::new(store))
    }

    /// Fixture without a configured feed, so no orchestrator.
    pub fn without_orchestrator() -> Self {
        let store = MockStateStore::new();
        Self::build(false, store.clone(), Arc::new(store))
    }

    /// Fixture whose orchestrator persists to the given store.
    pub fn with_state_store(state_store: Arc<dyn StateStore>) -> Self {
        Self::build(true, MockStateStore::new(), state_store)
    }

    fn build(
        with_orchestrator: bool,
        store: MockStateStore,
        state_store: Arc<dyn StateStore>,
    ) -> Self {
        let source = MockSourceProcessor::new();
        let pipeline = MockPostingPipeline::new();
        let gate = PostingGate::new(true);
        let settings = SettingsHandle::new(PostingSettings::default());
        let quota = QuotaHandle::new(&QuotaConfig::default());

        let config = Config {
            orchestrator: OrchestratorConfig {
                sales_interval_secs: 86_400,
                registration_interval_secs: 86_400,
                ..Default::default()
            },
            ..Default::default()
        };

        let orchestrator = with_orchestrator.then(|| {
            SyncOrchestrator::new(
                config.orchestrator.clone(),
                Arc::new(source.clone()),
                Arc::new(pipeline.clone()),
                state_store,
                gate.clone(),
            )
        });

        let state = Arc::new(AppState::new(
            config,
            orchestrator.clone(),
            gate.clone(),
            settings.clone(),
            quota.clone(),
        ));

        Self {
            router: salebot_server::api::create_router(state),
            orchestrator,
            source,
            pipeline,
            store,
            gate,
            settings,
            quota,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a PUT request with JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).to_string();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
