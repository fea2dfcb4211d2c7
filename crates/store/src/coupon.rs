//! Coupon store: coupon definitions and single-use redemption records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CouponId, Credits, UserCouponId, UserId};
use serde::{Deserialize, Serialize};

use crate::{Result, StoreError};

/// How a coupon's value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponType {
    /// `value` percent off the product price, rounded down.
    Percentage,
    /// `value` credits off the product price, never more than the price.
    Fixed,
    /// `value` credits off the delivery fee, never more than the fee.
    Delivery,
}

impl CouponType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CouponType::Percentage => "percentage",
            CouponType::Fixed => "fixed",
            CouponType::Delivery => "delivery",
        }
    }
}

impl std::str::FromStr for CouponType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "percentage" => Ok(CouponType::Percentage),
            "fixed" => Ok(CouponType::Fixed),
            "delivery" => Ok(CouponType::Delivery),
            other => Err(StoreError::Corrupt(format!("unknown coupon type '{other}'"))),
        }
    }
}

/// A globally defined coupon. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: CouponId,
    pub code: String,
    pub name: String,
    pub coupon_type: CouponType,
    pub value: i64,
    pub min_order_amount: Credits,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
}

impl Coupon {
    /// Returns true once `now` has reached the expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Computes the discount this coupon grants on an order.
    ///
    /// - percentage: `floor(product_price * value / 100)`
    /// - fixed: `min(value, product_price)`
    /// - delivery: `min(value, delivery_fee)`
    pub fn compute_discount(&self, product_price: Credits, delivery_fee: Credits) -> Credits {
        let value = Credits::new(self.value.max(0));
        match self.coupon_type {
            CouponType::Percentage => product_price.non_negative().percent_floor(value.units()),
            CouponType::Fixed => value.min(product_price.non_negative()),
            CouponType::Delivery => value.min(delivery_fee.non_negative()),
        }
    }
}

/// A coupon issued to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCoupon {
    pub id: UserCouponId,
    pub user_id: UserId,
    pub coupon_id: CouponId,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
}

impl UserCoupon {
    /// Issues an unused coupon to a user.
    pub fn issue(user_id: UserId, coupon_id: CouponId) -> Self {
        Self {
            id: UserCouponId::new(),
            user_id,
            coupon_id,
            is_used: false,
            used_at: None,
        }
    }
}

/// Coupon definitions and per-user redemption records.
///
/// This store only reads and redeems user coupons; issuing them belongs to
/// another service.
#[async_trait]
pub trait CouponStore: Send + Sync {
    /// Looks up a coupon by its public code.
    async fn get_coupon(&self, code: &str) -> Result<Coupon>;

    /// Looks up a coupon by ID.
    async fn get_coupon_by_id(&self, coupon_id: CouponId) -> Result<Coupon>;

    /// Returns the coupon issued to `user_id` for `coupon_id`.
    async fn get_user_coupon(&self, user_id: UserId, coupon_id: CouponId) -> Result<UserCoupon>;

    /// Looks up an issued coupon by its own ID.
    async fn get_user_coupon_by_id(&self, user_coupon_id: UserCouponId) -> Result<UserCoupon>;

    /// Marks the user coupon used if it is still unused.
    ///
    /// Fails with `CouponAlreadyUsed` and changes nothing otherwise.
    async fn redeem(&self, user_coupon_id: UserCouponId) -> Result<UserCoupon>;
}
