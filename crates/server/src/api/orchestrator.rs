//! Orchestrator API handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use salebot_core::{ManualSyncResult, StatusSnapshot, SyncOrchestrator, UpcomingRuns};

use crate::state::AppState;

/// Upper bound on projected fire times per task.
const MAX_UPCOMING: usize = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Orchestrator status response
#[derive(Debug, Serialize)]
pub struct OrchestratorStatusResponse {
    /// Whether the orchestrator is available (an upstream feed is configured)
    pub available: bool,
    #[serde(flatten)]
    pub status: Option<StatusSnapshot>,
}

#[derive(Debug, Deserialize)]
pub struct UpcomingQuery {
    /// Fire times per task (default: 5, max: 100)
    #[serde(default = "default_upcoming_count")]
    pub count: usize,
}

fn default_upcoming_count() -> usize {
    5
}

/// Error response
#[derive(Debug, Serialize)]
pub struct OrchestratorErrorResponse {
    pub error: String,
}

/// Simple message response
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Stop response
#[derive(Debug, Serialize)]
pub struct StopResponse {
    /// False when nothing was running.
    pub stopped: bool,
    pub message: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<OrchestratorErrorResponse>)>;

fn require_orchestrator(
    state: &AppState,
) -> Result<&SyncOrchestrator, (StatusCode, Json<OrchestratorErrorResponse>)> {
    state.orchestrator().ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(OrchestratorErrorResponse {
                error: "Orchestrator not available. Check that [feed] is configured.".to_string(),
            }),
        )
    })
}

// ============================================================================
// Handlers
// ============================================================================

/// Get orchestrator status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<OrchestratorStatusResponse> {
    match state.orchestrator() {
        Some(orch) => Json(OrchestratorStatusResponse {
            available: true,
            status: Some(orch.status().await),
        }),
        None => Json(OrchestratorStatusResponse {
            available: false,
            status: None,
        }),
    }
}

/// Projected fire times for both tasks
pub async fn get_upcoming(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UpcomingQuery>,
) -> ApiResult<UpcomingRuns> {
    let orch = require_orchestrator(&state)?;
    if query.count == 0 || query.count > MAX_UPCOMING {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(OrchestratorErrorResponse {
                error: format!("count must be between 1 and {}", MAX_UPCOMING),
            }),
        ));
    }
    Ok(Json(orch.upcoming_runs(query.count).await))
}

/// Start the orchestrator
pub async fn start(State(state): State<Arc<AppState>>) -> ApiResult<MessageResponse> {
    let orch = require_orchestrator(&state)?;
    orch.start().await;
    Ok(Json(MessageResponse {
        message: "Orchestrator started".to_string(),
    }))
}

/// Stop the orchestrator
pub async fn stop(State(state): State<Arc<AppState>>) -> ApiResult<StopResponse> {
    let orch = require_orchestrator(&state)?;
    let stopped = orch.stop().await;
    Ok(Json(StopResponse {
        stopped,
        message: if stopped {
            "Orchestrator stopped".to_string()
        } else {
            "Orchestrator was not running".to_string()
        },
    }))
}

/// Stop the orchestrator regardless of state
pub async fn force_stop(State(state): State<Arc<AppState>>) -> ApiResult<MessageResponse> {
    let orch = require_orchestrator(&state)?;
    orch.force_stop().await;
    Ok(Json(MessageResponse {
        message: "Orchestrator force-stopped".to_string(),
    }))
}

/// Clear the consecutive error counter
pub async fn reset_errors(State(state): State<Arc<AppState>>) -> ApiResult<MessageResponse> {
    let orch = require_orchestrator(&state)?;
    orch.reset_error_counter().await;
    Ok(Json(MessageResponse {
        message: "Error counter reset".to_string(),
    }))
}

/// Run both syncs now. Failures are reported in the body, not the status.
pub async fn trigger_sync(State(state): State<Arc<AppState>>) -> ApiResult<ManualSyncResult> {
    let orch = require_orchestrator(&state)?;
    Ok(Json(orch.trigger_manual_sync().await))
}
