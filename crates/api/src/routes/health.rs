//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub product_service_circuit: &'static str,
    pub pending_stock_commands: usize,
    pub subscribers: usize,
}

/// GET /health — returns system health status.
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        product_service_circuit: state.coordinator.gate().state().as_str(),
        pending_stock_commands: state.stock_channel.pending(),
        subscribers: state.notifications.len(),
    })
}
