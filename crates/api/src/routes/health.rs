//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use store::SettlementStore;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub pending_reconciliation: usize,
}

/// GET /health: `degraded` while settlements await reconciliation.
pub async fn check<S: SettlementStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<HealthResponse> {
    let pending_reconciliation = state.coordinator.pending_reconciliation().await.len();
    let status = if pending_reconciliation == 0 {
        "ok"
    } else {
        "degraded"
    };
    Json(HealthResponse {
        status,
        pending_reconciliation,
    })
}
