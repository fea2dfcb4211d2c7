//! All-or-nothing commit of a purchase.

use async_trait::async_trait;
use common::Credits;

use crate::{Result, Transaction};

/// Outcome of a committed settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedSettlement {
    pub transaction: Transaction,
    pub buyer_balance: Credits,
    pub seller_balance: Credits,
    /// False when the applied coupon was already used at commit time.
    pub coupon_redeemed: bool,
}

/// A store that can apply every write of a purchase in one scope.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Commits the writes described by `transaction`:
    /// - marks `product_id` sold to `buyer_id`
    /// - debits `amount` from the buyer
    /// - credits `product_price` to the seller
    /// - redeems `applied_coupon_id`, if any
    /// - appends the transaction
    ///
    /// Either every write applies or none does. Failures carry the same
    /// errors as the single operations (`AlreadySold`, `InsufficientFunds`,
    /// `TransactionConflict`, `NotFound`).
    async fn commit_settlement(&self, transaction: Transaction) -> Result<CommittedSettlement>;
}
