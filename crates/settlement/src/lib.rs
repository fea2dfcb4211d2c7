//! Purchase settlement.
//!
//! A purchase moves credits from buyer to seller and marks the product sold.
//! The coordinator commits it in a fixed order:
//! 1. Reserve the product
//! 2. Debit the buyer
//! 3. Credit the seller
//! 4. Redeem the applied coupon
//! 5. Append the transaction record
//!
//! Over a store with a unit of work all five apply together or not at all.
//! Run step by step, a failure before the debit compensates the reservation
//! and later steps that stay unavailable are queued for reconciliation
//! instead of rolling back.

pub mod attempt;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod locks;
pub mod receipt;
pub mod reconciliation;
pub mod retry;
pub mod state;
pub mod steps;

pub use attempt::SettlementAttempt;
pub use config::SettlementConfig;
pub use coordinator::{MAX_CHARGE_AMOUNT, SettlementCoordinator};
pub use error::{ReasonCode, Result, SettlementError};
pub use locks::KeyedLocks;
pub use receipt::SettlementReceipt;
pub use reconciliation::{PendingAction, ReconciliationQueue};
pub use retry::RetryConfig;
pub use state::SettlementState;
