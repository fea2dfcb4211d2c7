use common::{Credits, ProductId, TransactionId, UserCouponId, UserId};
use thiserror::Error;

/// Errors that can occur when interacting with the settlement stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A conditional debit found a balance lower than the requested amount.
    #[error("Insufficient funds for user {user_id}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        user_id: UserId,
        balance: Credits,
        requested: Credits,
    },

    /// A compare-and-set on product status found it already sold.
    #[error("Product already sold: {0}")]
    AlreadySold(ProductId),

    /// A compensation tried to release a product that is not sold to the given buyer.
    #[error("Product {product_id} is not sold to {buyer_id}")]
    NotSoldTo {
        product_id: ProductId,
        buyer_id: UserId,
    },

    /// A compare-and-set on a user coupon found it already used.
    #[error("Coupon already used: {0}")]
    CouponAlreadyUsed(UserCouponId),

    /// A transaction with this ID already exists, or the product already has
    /// a completed transaction.
    #[error("Transaction conflict for {transaction_id}: {reason}")]
    TransactionConflict {
        transaction_id: TransactionId,
        reason: String,
    },

    /// A status change did not match the expected current status.
    #[error("Invalid status transition for {transaction_id}: {from} -> {to}")]
    InvalidStatusTransition {
        transaction_id: TransactionId,
        from: String,
        to: String,
    },

    /// Amounts passed to ledger operations must be positive.
    #[error("Invalid amount: {0}")]
    InvalidAmount(Credits),

    /// A stored value could not be decoded into a domain record.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// The store could not be reached. Safe to retry.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns true if the operation certainly did not apply and may be retried.
    ///
    /// I/O errors mid-statement are not transient: the write may have
    /// committed before the connection dropped.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(err) => matches!(err, sqlx::Error::PoolTimedOut),
            _ => false,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_is_transient() {
        assert!(StoreError::Unavailable("connection reset".to_string()).is_transient());
        assert!(StoreError::Database(sqlx::Error::PoolTimedOut).is_transient());
    }

    #[test]
    fn business_rejections_are_not_transient() {
        assert!(!StoreError::AlreadySold(ProductId::new()).is_transient());
        assert!(
            !StoreError::InsufficientFunds {
                user_id: UserId::new(),
                balance: Credits::new(10),
                requested: Credits::new(20),
            }
            .is_transient()
        );
        assert!(!StoreError::Database(sqlx::Error::RowNotFound).is_transient());
    }
}
