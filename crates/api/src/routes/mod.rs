pub mod coupons;
pub mod credits;
pub mod health;
pub mod metrics;
pub mod purchases;
pub mod transactions;
