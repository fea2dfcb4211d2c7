//! API error types with HTTP response mapping.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use settlement::{ReasonCode, SettlementError};

/// API-level error type that maps to HTTP responses.
///
/// Every error body is `{ "error": <message>, "code": <reason code> }`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The caller did not present a usable identity.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Malformed path, query or body.
    #[error("{0}")]
    BadRequest(String),

    /// A settlement or query failed.
    #[error(transparent)]
    Settlement(#[from] SettlementError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "Unauthorized", msg),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ReasonCode::ValidationError.as_str(),
                msg,
            ),
            ApiError::Settlement(err) => {
                let code = err.code();
                let status = status_for(code);
                let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(error = %err, "internal server error");
                    "internal server error".to_string()
                } else {
                    err.to_string()
                };
                (status, code.as_str(), message)
            }
        };

        let body = serde_json::json!({ "error": message, "code": code });
        (status, axum::Json(body)).into_response()
    }
}

/// HTTP status reported for each reason code.
pub fn status_for(code: ReasonCode) -> StatusCode {
    match code {
        ReasonCode::ValidationError | ReasonCode::CouponInvalid | ReasonCode::CouponExpired => {
            StatusCode::BAD_REQUEST
        }
        ReasonCode::CouponAlreadyUsed | ReasonCode::AlreadySold => StatusCode::CONFLICT,
        ReasonCode::SelfPurchase => StatusCode::FORBIDDEN,
        ReasonCode::NotFound => StatusCode::NOT_FOUND,
        ReasonCode::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
        ReasonCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ReasonCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_rejections_map_to_client_errors() {
        assert_eq!(
            status_for(ReasonCode::InsufficientFunds),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(status_for(ReasonCode::AlreadySold), StatusCode::CONFLICT);
        assert_eq!(status_for(ReasonCode::SelfPurchase), StatusCode::FORBIDDEN);
        assert_eq!(
            status_for(ReasonCode::CouponAlreadyUsed),
            StatusCode::CONFLICT
        );
        assert_eq!(status_for(ReasonCode::CouponExpired), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_unavailable_maps_to_503() {
        assert_eq!(
            status_for(ReasonCode::ServiceUnavailable),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_settlement_error_response_status() {
        let response =
            ApiError::from(SettlementError::Validation("phone is required".to_string()))
                .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ApiError::Unauthorized("missing header".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
