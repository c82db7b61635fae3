//! Posting gate and settings handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use salebot_core::{PostingSettings, QuotaStatus};
use tracing::info;

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct GateState {
    pub auto_posting_enabled: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct PostingErrorResponse {
    pub error: String,
}

pub async fn get_gate(State(state): State<Arc<AppState>>) -> Json<GateState> {
    Json(GateState {
        auto_posting_enabled: state.gate().is_auto_posting_enabled(),
    })
}

pub async fn set_gate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GateState>,
) -> Json<GateState> {
    state.gate().set_auto_posting(body.auto_posting_enabled);
    Json(GateState {
        auto_posting_enabled: state.gate().is_auto_posting_enabled(),
    })
}

pub async fn get_quota(State(state): State<Arc<AppState>>) -> Json<QuotaStatus> {
    Json(state.quota().status().await)
}

pub async fn get_settings(State(state): State<Arc<AppState>>) -> Json<PostingSettings> {
    Json(state.settings().get().await)
}

pub async fn set_settings(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<PostingSettings>,
) -> Result<Json<PostingSettings>, (StatusCode, Json<PostingErrorResponse>)> {
    if !settings.min_sale_price.is_finite() || settings.min_sale_price < 0.0 {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(PostingErrorResponse {
                error: "min_sale_price must be a non-negative number".to_string(),
            }),
        ));
    }

    info!(
        enabled = settings.enabled,
        registrations_enabled = settings.registrations_enabled,
        min_sale_price = settings.min_sale_price,
        "Posting settings updated"
    );
    state.settings().set(settings.clone()).await;
    Ok(Json(settings))
}
