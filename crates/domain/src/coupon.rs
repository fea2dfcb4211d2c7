//! Coupon eligibility rules shared by the validation query and the purchase path.

use chrono::{DateTime, Utc};
use common::{Credits, UserCouponId, UserId};
use serde::{Deserialize, Serialize};
use store::{Coupon, CouponType, DeliveryType, UserCoupon};
use thiserror::Error;

use crate::error::DomainError;
use crate::pricing::delivery_fee;

/// Why a coupon cannot be applied.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail")]
pub enum CouponRejection {
    /// Unknown, inactive, not issued to the buyer, or order below minimum.
    #[error("coupon is not valid: {0}")]
    Invalid(String),

    /// The coupon's expiry has passed.
    #[error("coupon has expired")]
    Expired,

    /// The issued coupon was already redeemed.
    #[error("coupon has already been used")]
    AlreadyUsed,
}

/// Request for the coupon validation query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CouponValidationRequest {
    pub coupon_code: String,
    pub product_price: Credits,
    /// Prices delivery coupons; standard when omitted.
    #[serde(default)]
    pub delivery_type: DeliveryType,
}

impl CouponValidationRequest {
    pub fn new(coupon_code: impl Into<String>, product_price: Credits) -> Self {
        Self {
            coupon_code: coupon_code.into(),
            product_price,
            delivery_type: DeliveryType::default(),
        }
    }

    pub fn with_delivery(mut self, delivery_type: DeliveryType) -> Self {
        self.delivery_type = delivery_type;
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.coupon_code.trim().is_empty() {
            return Err(DomainError::validation("coupon_code", "is required"));
        }
        if !self.product_price.is_positive() {
            return Err(DomainError::validation("product_price", "must be positive"));
        }
        Ok(())
    }
}

/// The discount a coupon would grant the buyer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponQuote {
    pub discount: Credits,
    pub name: String,
    pub coupon_type: CouponType,
    pub value: i64,
    pub user_coupon_id: UserCouponId,
}

/// Decides whether `user_coupon` may be applied by `buyer_id` to a product
/// priced `product_price` shipped by `delivery_type`, returning the quote if so.
///
/// Rule order: ownership, active, expiry, usage, minimum order.
pub fn check_eligibility(
    coupon: &Coupon,
    user_coupon: &UserCoupon,
    buyer_id: UserId,
    product_price: Credits,
    delivery_type: DeliveryType,
    now: DateTime<Utc>,
) -> Result<CouponQuote, CouponRejection> {
    if user_coupon.user_id != buyer_id || user_coupon.coupon_id != coupon.id {
        return Err(CouponRejection::Invalid(
            "coupon was not issued to this user".to_string(),
        ));
    }
    if !coupon.is_active {
        return Err(CouponRejection::Invalid("coupon is inactive".to_string()));
    }
    if coupon.is_expired_at(now) {
        return Err(CouponRejection::Expired);
    }
    if user_coupon.is_used {
        return Err(CouponRejection::AlreadyUsed);
    }
    if product_price < coupon.min_order_amount {
        return Err(CouponRejection::Invalid(format!(
            "order of {product_price} is below the minimum of {}",
            coupon.min_order_amount
        )));
    }

    Ok(CouponQuote {
        discount: coupon.compute_discount(product_price, delivery_fee(delivery_type)),
        name: coupon.name.clone(),
        coupon_type: coupon.coupon_type,
        value: coupon.value,
        user_coupon_id: user_coupon.id,
    })
}
