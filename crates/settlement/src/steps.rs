//! Purchase settlement step names, in commit order.

/// Step name: mark the product sold to the buyer.
pub const STEP_RESERVE: &str = "reserve";

/// Step name: charge the buyer.
pub const STEP_DEBIT: &str = "debit";

/// Step name: pay the seller.
pub const STEP_CREDIT: &str = "credit";

/// Step name: mark the applied coupon used.
pub const STEP_COUPON_REDEEM: &str = "coupon_redeem";

/// Step name: append the transaction record.
pub const STEP_LOG: &str = "log";
