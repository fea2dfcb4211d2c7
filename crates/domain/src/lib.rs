//! Domain rules for the purchase settlement engine.
//!
//! This crate holds everything that can be decided without touching a store:
//! - the validated purchase request shape
//! - delivery fees and the server-side price quote
//! - coupon eligibility and the reason a coupon was rejected

pub mod coupon;
pub mod error;
pub mod pricing;
pub mod request;

pub use coupon::{CouponQuote, CouponRejection, CouponValidationRequest, check_eligibility};
pub use error::DomainError;
pub use pricing::{EXPRESS_DELIVERY_FEE, PriceQuote, STANDARD_DELIVERY_FEE, delivery_fee};
pub use request::{AppliedCoupon, PurchaseRequest};
