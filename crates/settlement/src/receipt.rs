//! The outcome returned to the buyer after a successful settlement.

use common::{Credits, ProductId, TransactionId, UserCouponId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::ReasonCode;

/// Result of a settled purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub transaction_id: TransactionId,
    pub product_id: ProductId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    /// What the buyer was charged.
    pub amount: Credits,
    pub product_price: Credits,
    pub delivery_fee: Credits,
    pub discount: Credits,
    /// Buyer balance right after the debit.
    pub buyer_credits: Credits,
    /// Seller balance right after the credit, or `None` if it was deferred.
    pub seller_credits: Option<Credits>,
    pub applied_user_coupon_id: Option<UserCouponId>,
    /// Why a submitted coupon was ignored.
    pub coupon_rejection: Option<ReasonCode>,
    /// True if some post-debit work is waiting in the reconciliation queue.
    pub reconciliation_pending: bool,
}
