//! Credit balance endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use common::{Credits, UserId};
use serde::{Deserialize, Serialize};
use store::SettlementStore;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::CurrentUser;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChargeRequest {
    pub amount: Credits,
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub user_id: UserId,
    pub balance: Credits,
}

/// GET /credits: the caller's balance.
#[tracing::instrument(skip(state), fields(user_id = %user_id))]
pub async fn balance<S: SettlementStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.coordinator.balance(user_id).await?;
    Ok(Json(BalanceResponse { user_id, balance }))
}

/// POST /credits/charge: top up the caller's balance.
#[tracing::instrument(skip(state, payload), fields(user_id = %user_id))]
pub async fn charge<S: SettlementStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user_id): CurrentUser,
    payload: Result<Json<ChargeRequest>, JsonRejection>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let Json(request) = payload?;
    let balance = state.coordinator.charge(user_id, request.amount).await?;
    Ok(Json(BalanceResponse { user_id, balance }))
}
