//! Transaction log: the append-only record of completed settlements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Credits, ProductId, TransactionId, UserCouponId, UserId};
use serde::{Deserialize, Serialize};

use crate::{Result, StoreError, TransactionQuery};

/// Lifecycle status of a transaction.
///
/// ```text
/// Completed ──┬──► Cancelled
///             └──► Refunded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    #[default]
    Completed,
    Cancelled,
    Refunded,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Completed => "completed",
            TransactionStatus::Cancelled => "cancelled",
            TransactionStatus::Refunded => "refunded",
        }
    }

    /// Returns true if a status change from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (
                TransactionStatus::Completed,
                TransactionStatus::Cancelled | TransactionStatus::Refunded
            )
        )
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "completed" => Ok(TransactionStatus::Completed),
            "cancelled" => Ok(TransactionStatus::Cancelled),
            "refunded" => Ok(TransactionStatus::Refunded),
            other => Err(StoreError::Corrupt(format!(
                "unknown transaction status '{other}'"
            ))),
        }
    }
}

/// Delivery speed chosen by the buyer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryType {
    #[default]
    Standard,
    Express,
}

impl DeliveryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryType::Standard => "standard",
            DeliveryType::Express => "express",
        }
    }
}

impl std::str::FromStr for DeliveryType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "standard" => Ok(DeliveryType::Standard),
            "express" => Ok(DeliveryType::Express),
            other => Err(StoreError::Corrupt(format!("unknown delivery type '{other}'"))),
        }
    }
}

/// Where and to whom the product is shipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct DeliveryInfo {
    pub recipient_name: String,
    pub phone: String,
    pub zip_code: String,
    pub address: String,
    #[serde(default)]
    pub detail_address: String,
    #[serde(default)]
    pub delivery_request: String,
}

/// A settled purchase with its full price breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub product_id: ProductId,
    pub product_price: Credits,
    pub delivery_fee: Credits,
    pub discount: Credits,
    /// What the buyer paid: `max(product_price + delivery_fee - discount, 0)`.
    pub amount: Credits,
    pub applied_coupon_id: Option<UserCouponId>,
    pub delivery_type: DeliveryType,
    pub delivery_info: DeliveryInfo,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// The ledger movements that exactly undo this transaction.
    pub fn reversal(&self) -> LedgerReversal {
        LedgerReversal {
            transaction_id: self.id,
            buyer_id: self.buyer_id,
            buyer_credit: self.amount,
            seller_id: self.seller_id,
            seller_debit: self.product_price,
        }
    }
}

/// Ledger reversal mirroring a transaction's `amount` / `product_price` split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReversal {
    pub transaction_id: TransactionId,
    pub buyer_id: UserId,
    pub buyer_credit: Credits,
    pub seller_id: UserId,
    pub seller_debit: Credits,
}

/// Append-only log of completed settlements.
#[async_trait]
pub trait TransactionLog: Send + Sync {
    /// Appends a completed transaction.
    ///
    /// Fails with `TransactionConflict` if the ID exists or the product
    /// already has a completed transaction.
    async fn append(&self, transaction: Transaction) -> Result<Transaction>;

    /// Loads a transaction by ID.
    async fn get_transaction(&self, transaction_id: TransactionId) -> Result<Transaction>;

    /// Lists a participant's transactions, newest first.
    async fn list_for_participant(&self, query: TransactionQuery) -> Result<Vec<Transaction>>;

    /// Changes the status of a transaction if it currently equals `expected`.
    ///
    /// Amounts are never edited.
    async fn update_status(
        &self,
        transaction_id: TransactionId,
        expected: TransactionStatus,
        next: TransactionStatus,
    ) -> Result<Transaction>;
}

pub(crate) fn check_status_transition(
    transaction_id: TransactionId,
    current: TransactionStatus,
    expected: TransactionStatus,
    next: TransactionStatus,
) -> Result<()> {
    if current != expected || !current.can_transition_to(next) {
        return Err(StoreError::InvalidStatusTransition {
            transaction_id,
            from: current.to_string(),
            to: next.to_string(),
        });
    }
    Ok(())
}
