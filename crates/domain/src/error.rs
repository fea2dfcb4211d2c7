//! Domain error types.

use thiserror::Error;

use crate::coupon::CouponRejection;

/// Errors raised by domain rules.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Input is malformed or out of bounds.
    #[error("Invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// A coupon cannot be applied.
    #[error("Coupon rejected: {0}")]
    Coupon(#[from] CouponRejection),
}

impl DomainError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        DomainError::Validation {
            field,
            message: message.into(),
        }
    }
}
