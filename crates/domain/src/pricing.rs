//! Server-side pricing. A client-submitted total is never trusted.

use common::Credits;
use serde::{Deserialize, Serialize};
use store::DeliveryType;

use crate::error::DomainError;

/// Fee for standard delivery.
pub const STANDARD_DELIVERY_FEE: Credits = Credits::new(3_000);

/// Fee for express delivery.
pub const EXPRESS_DELIVERY_FEE: Credits = Credits::new(5_000);

/// Returns the delivery fee for a delivery type.
pub fn delivery_fee(delivery_type: DeliveryType) -> Credits {
    match delivery_type {
        DeliveryType::Standard => STANDARD_DELIVERY_FEE,
        DeliveryType::Express => EXPRESS_DELIVERY_FEE,
    }
}

/// The full price breakdown of one purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub product_price: Credits,
    pub delivery_fee: Credits,
    pub discount: Credits,
    /// `max(product_price + delivery_fee - discount, 0)`
    pub amount: Credits,
}

impl PriceQuote {
    /// Prices a purchase.
    ///
    /// Fails when the price plus the delivery fee does not fit in [`Credits`].
    pub fn new(
        product_price: Credits,
        delivery_type: DeliveryType,
        discount: Credits,
    ) -> Result<Self, DomainError> {
        let delivery_fee = delivery_fee(delivery_type);
        let gross = product_price
            .checked_add(delivery_fee)
            .ok_or_else(|| DomainError::validation("product_price", "is too large to price"))?;
        let amount = gross
            .checked_sub(discount)
            .unwrap_or(Credits::zero())
            .non_negative();
        Ok(Self {
            product_price,
            delivery_fee,
            discount,
            amount,
        })
    }

    /// Prices a purchase with no discount.
    pub fn without_discount(
        product_price: Credits,
        delivery_type: DeliveryType,
    ) -> Result<Self, DomainError> {
        Self::new(product_price, delivery_type, Credits::zero())
    }

    pub fn has_discount(&self) -> bool {
        self.discount.is_positive()
    }
}
