//! Catalog store: product listings and the "sold at most once" rule.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Credits, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::{Result, StoreError};

/// Availability of a product listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    #[default]
    Available,
    Sold,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Available => "available",
            ProductStatus::Sold => "sold",
        }
    }
}

impl std::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProductStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "available" => Ok(ProductStatus::Available),
            "sold" => Ok(ProductStatus::Sold),
            other => Err(StoreError::Corrupt(format!(
                "unknown product status '{other}'"
            ))),
        }
    }
}

/// A product listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub seller_id: UserId,
    pub title: String,
    pub price: Credits,
    pub status: ProductStatus,
    pub buyer_id: Option<UserId>,
    pub sold_at: Option<DateTime<Utc>>,
}

impl Product {
    /// Creates an available listing.
    pub fn new(seller_id: UserId, title: impl Into<String>, price: Credits) -> Self {
        Self {
            id: ProductId::new(),
            seller_id,
            title: title.into(),
            price,
            status: ProductStatus::Available,
            buyer_id: None,
            sold_at: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == ProductStatus::Available
    }
}

/// Product listings with a compare-and-set sale transition.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Returns the product snapshot including its current status.
    async fn get_product(&self, product_id: ProductId) -> Result<Product>;

    /// Marks the product sold to `buyer_id` if its status equals `expected`.
    ///
    /// This is the serialization point for concurrent buyers: exactly one
    /// caller observes the transition, every other caller gets `AlreadySold`
    /// and nothing changes.
    async fn mark_sold(
        &self,
        product_id: ProductId,
        buyer_id: UserId,
        expected: ProductStatus,
    ) -> Result<Product>;

    /// Compensation for a failed settlement that already reserved the product.
    ///
    /// Only succeeds while the product is sold to `buyer_id`.
    async fn revert_to_available(&self, product_id: ProductId, buyer_id: UserId) -> Result<Product>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_product_is_available() {
        let product = Product::new(UserId::new(), "Desk lamp", Credits::new(12_000));
        assert!(product.is_available());
        assert!(product.buyer_id.is_none());
        assert!(product.sold_at.is_none());
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [ProductStatus::Available, ProductStatus::Sold] {
            assert_eq!(status.as_str().parse::<ProductStatus>().unwrap(), status);
        }
        assert!("reserved".parse::<ProductStatus>().is_err());
    }
}
