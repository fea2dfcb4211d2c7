//! Purchase endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::ProductId;
use domain::PurchaseRequest;
use settlement::SettlementReceipt;
use store::SettlementStore;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::CurrentUser;

/// POST /products/{id}/purchase: settle a purchase for the caller.
#[tracing::instrument(skip(state, path, payload), fields(buyer_id = %buyer_id))]
pub async fn purchase<S: SettlementStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(buyer_id): CurrentUser,
    path: Result<Path<ProductId>, PathRejection>,
    payload: Result<Json<PurchaseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SettlementReceipt>), ApiError> {
    let Path(product_id) = path?;
    let Json(request) = payload?;

    let receipt = state
        .coordinator
        .purchase(buyer_id, product_id, request)
        .await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}
