//! Settlement error types.

use common::{Credits, ProductId};
use domain::{CouponRejection, DomainError};
use serde::{Deserialize, Serialize};
use store::StoreError;
use thiserror::Error;

use crate::state::SettlementState;

/// Stable, machine-readable reason a settlement or query failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReasonCode {
    InsufficientFunds,
    AlreadySold,
    SelfPurchase,
    ValidationError,
    CouponInvalid,
    CouponAlreadyUsed,
    CouponExpired,
    ServiceUnavailable,
    NotFound,
    Internal,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::InsufficientFunds => "InsufficientFunds",
            ReasonCode::AlreadySold => "AlreadySold",
            ReasonCode::SelfPurchase => "SelfPurchase",
            ReasonCode::ValidationError => "ValidationError",
            ReasonCode::CouponInvalid => "CouponInvalid",
            ReasonCode::CouponAlreadyUsed => "CouponAlreadyUsed",
            ReasonCode::CouponExpired => "CouponExpired",
            ReasonCode::ServiceUnavailable => "ServiceUnavailable",
            ReasonCode::NotFound => "NotFound",
            ReasonCode::Internal => "Internal",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by the settlement coordinator.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// Request input is malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: Credits, required: Credits },

    #[error("Product already sold: {0}")]
    AlreadySold(ProductId),

    #[error("Cannot purchase own product: {0}")]
    SelfPurchase(ProductId),

    #[error("Coupon invalid: {0}")]
    CouponInvalid(String),

    #[error("Coupon has already been used")]
    CouponAlreadyUsed,

    #[error("Coupon has expired")]
    CouponExpired,

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A store stayed unavailable after retries, or the deadline passed
    /// before the buyer was charged.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The attempt tried an illegal state transition.
    #[error("Invalid settlement state transition: {from} -> {to}")]
    InvalidState {
        from: SettlementState,
        to: SettlementState,
    },

    /// A store failure that is neither a business rejection nor transient.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl SettlementError {
    /// Returns the reason code reported to callers.
    pub fn code(&self) -> ReasonCode {
        match self {
            SettlementError::Validation(_) => ReasonCode::ValidationError,
            SettlementError::InsufficientFunds { .. } => ReasonCode::InsufficientFunds,
            SettlementError::AlreadySold(_) => ReasonCode::AlreadySold,
            SettlementError::SelfPurchase(_) => ReasonCode::SelfPurchase,
            SettlementError::CouponInvalid(_) => ReasonCode::CouponInvalid,
            SettlementError::CouponAlreadyUsed => ReasonCode::CouponAlreadyUsed,
            SettlementError::CouponExpired => ReasonCode::CouponExpired,
            SettlementError::NotFound { .. } => ReasonCode::NotFound,
            SettlementError::ServiceUnavailable(_) => ReasonCode::ServiceUnavailable,
            SettlementError::InvalidState { .. } | SettlementError::Store(_) => {
                ReasonCode::Internal
            }
        }
    }

    /// Returns true if the error is a coupon rejection.
    pub fn is_coupon_rejection(&self) -> bool {
        matches!(
            self,
            SettlementError::CouponInvalid(_)
                | SettlementError::CouponAlreadyUsed
                | SettlementError::CouponExpired
        )
    }
}

impl From<StoreError> for SettlementError {
    fn from(err: StoreError) -> Self {
        if err.is_transient() {
            return SettlementError::ServiceUnavailable(err.to_string());
        }
        match err {
            StoreError::NotFound { entity, id } => SettlementError::NotFound { entity, id },
            StoreError::InsufficientFunds {
                balance, requested, ..
            } => SettlementError::InsufficientFunds {
                balance,
                required: requested,
            },
            StoreError::AlreadySold(product_id) => SettlementError::AlreadySold(product_id),
            StoreError::CouponAlreadyUsed(_) => SettlementError::CouponAlreadyUsed,
            StoreError::InvalidAmount(amount) => {
                SettlementError::Validation(format!("invalid amount: {amount}"))
            }
            other => SettlementError::Store(other),
        }
    }
}

impl From<CouponRejection> for SettlementError {
    fn from(rejection: CouponRejection) -> Self {
        match rejection {
            CouponRejection::Invalid(reason) => SettlementError::CouponInvalid(reason),
            CouponRejection::Expired => SettlementError::CouponExpired,
            CouponRejection::AlreadyUsed => SettlementError::CouponAlreadyUsed,
        }
    }
}

impl From<DomainError> for SettlementError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation { .. } => SettlementError::Validation(err.to_string()),
            DomainError::Coupon(rejection) => rejection.into(),
        }
    }
}

/// Convenience type alias for settlement results.
pub type Result<T> = std::result::Result<T, SettlementError>;
