//! Storage layer for the purchase settlement engine.
//!
//! Four stores, each exposing only conditional (compare-and-set) mutations
//! for its contended state:
//! - [`LedgerStore`]: per-user credit balances
//! - [`CatalogStore`]: product listings, sold at most once
//! - [`CouponStore`]: coupon definitions and single-use redemptions
//! - [`TransactionLog`]: append-only record of completed settlements
//!
//! [`InMemoryStore`] and [`PostgresStore`] implement all four, plus
//! [`UnitOfWork`] to commit a whole purchase at once.

pub mod catalog;
pub mod coupon;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod transaction;
pub mod unit_of_work;

pub use catalog::{CatalogStore, Product, ProductStatus};
pub use coupon::{Coupon, CouponStore, CouponType, UserCoupon};
pub use error::{Result, StoreError};
pub use ledger::{LedgerStore, Role, User};
pub use memory::{InMemoryStore, StoreOperation};
pub use postgres::PostgresStore;
pub use query::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, ParticipantRole, TransactionQuery};
pub use transaction::{
    DeliveryInfo, DeliveryType, LedgerReversal, Transaction, TransactionLog, TransactionStatus,
};
pub use unit_of_work::{CommittedSettlement, UnitOfWork};

/// A single handle implementing every store the settlement engine needs.
pub trait SettlementStore:
    LedgerStore + CatalogStore + CouponStore + TransactionLog + UnitOfWork + Clone + 'static
{
}

// Blanket implementation for any handle that implements all the stores
impl<T> SettlementStore for T where
    T: LedgerStore + CatalogStore + CouponStore + TransactionLog + UnitOfWork + Clone + 'static
{
}
