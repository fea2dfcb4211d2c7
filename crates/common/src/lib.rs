//! Shared types for the settlement engine.
//!
//! Identifier newtypes keep user, product, coupon and transaction IDs from
//! being mixed up, and [`Credits`] carries every balance and price.

pub mod types;

pub use types::{CouponId, Credits, ProductId, TransactionId, UserCouponId, UserId};
