//! Coupon validation endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use domain::{CouponQuote, CouponValidationRequest};
use store::SettlementStore;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::CurrentUser;

/// POST /coupons/validate: quote the discount a coupon code would give.
#[tracing::instrument(skip(state, payload), fields(user_id = %user_id))]
pub async fn validate<S: SettlementStore>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user_id): CurrentUser,
    payload: Result<Json<CouponValidationRequest>, JsonRejection>,
) -> Result<Json<CouponQuote>, ApiError> {
    let Json(request) = payload?;
    let quote = state.coordinator.validate_coupon(user_id, request).await?;
    Ok(Json(quote))
}
