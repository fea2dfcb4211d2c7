//! Transaction history endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use common::TransactionId;
use serde::{Deserialize, Serialize};
use store::{ParticipantRole, SettlementStore, Transaction, TransactionQuery};

use crate::AppState;
use crate::error::ApiError;
use crate::extract::CurrentUser;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListParams {
    pub role: Option<ParticipantRole>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Serialize)]
pub struct TransactionPage {
    pub transactions: Vec<Transaction>,
    pub limit: usize,
    pub offset: usize,
}

/// GET /transactions: the caller's transactions, newest first.
#[tracing::instrument(skip(state, params), fields(user_id = %user_id))]
pub async fn list<S: SettlementStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user_id): CurrentUser,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<TransactionPage>, ApiError> {
    let Query(params) = params?;
    let query = TransactionQuery {
        participant: user_id,
        role: params.role,
        limit: params.limit,
        offset: params.offset,
    };

    let limit = query.effective_limit();
    let offset = query.effective_offset();
    let transactions = state.coordinator.transactions(query).await?;

    Ok(Json(TransactionPage {
        transactions,
        limit,
        offset,
    }))
}

/// GET /transactions/{id}: one transaction, visible only to its buyer and seller.
#[tracing::instrument(skip(state, path), fields(user_id = %user_id))]
pub async fn get<S: SettlementStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user_id): CurrentUser,
    path: Result<Path<TransactionId>, PathRejection>,
) -> Result<Json<Transaction>, ApiError> {
    let Path(transaction_id) = path?;
    let transaction = state
        .coordinator
        .transaction_for(user_id, transaction_id)
        .await?;
    Ok(Json(transaction))
}
