//! The validated purchase request shape.

use common::UserCouponId;
use serde::{Deserialize, Serialize};
use store::{DeliveryInfo, DeliveryType};

use crate::error::DomainError;

pub const MAX_RECIPIENT_NAME_CHARS: usize = 100;
pub const MAX_DELIVERY_REQUEST_CHARS: usize = 500;
pub const MAX_PHONE_CHARS: usize = 20;
pub const MAX_ZIP_CODE_CHARS: usize = 10;
pub const MAX_ADDRESS_CHARS: usize = 200;

/// Reference to a coupon the buyer wants applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppliedCoupon {
    pub user_coupon_id: UserCouponId,
}

/// A purchase submission. It carries no total field: the price
/// is always recomputed on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PurchaseRequest {
    pub delivery_info: DeliveryInfo,
    #[serde(default)]
    pub delivery_type: DeliveryType,
    #[serde(default)]
    pub applied_coupon: Option<AppliedCoupon>,
}

impl PurchaseRequest {
    pub fn new(delivery_info: DeliveryInfo, delivery_type: DeliveryType) -> Self {
        Self {
            delivery_info,
            delivery_type,
            applied_coupon: None,
        }
    }

    pub fn with_coupon(mut self, user_coupon_id: UserCouponId) -> Self {
        self.applied_coupon = Some(AppliedCoupon { user_coupon_id });
        self
    }

    /// Checks every field bound before the request reaches the coordinator.
    pub fn validate(&self) -> Result<(), DomainError> {
        let info = &self.delivery_info;

        required("recipient_name", &info.recipient_name, MAX_RECIPIENT_NAME_CHARS)?;
        required("phone", &info.phone, MAX_PHONE_CHARS)?;
        required("zip_code", &info.zip_code, MAX_ZIP_CODE_CHARS)?;
        required("address", &info.address, MAX_ADDRESS_CHARS)?;
        bounded("detail_address", &info.detail_address, MAX_ADDRESS_CHARS)?;
        bounded(
            "delivery_request",
            &info.delivery_request,
            MAX_DELIVERY_REQUEST_CHARS,
        )?;

        if !info
            .phone
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | ' '))
        {
            return Err(DomainError::validation(
                "phone",
                "may only contain digits, '-', '+' and spaces",
            ));
        }

        Ok(())
    }
}

fn required(field: &'static str, value: &str, max_chars: usize) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(field, "is required"));
    }
    bounded(field, value, max_chars)
}

fn bounded(field: &'static str, value: &str, max_chars: usize) -> Result<(), DomainError> {
    let len = value.chars().count();
    if len > max_chars {
        return Err(DomainError::validation(
            field,
            format!("must be at most {max_chars} characters, got {len}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery_info() -> DeliveryInfo {
        DeliveryInfo {
            recipient_name: "Kim Minji".to_string(),
            phone: "010-1234-5678".to_string(),
            zip_code: "06236".to_string(),
            address: "Teheran-ro 152, Gangnam-gu".to_string(),
            detail_address: "Apt 1203".to_string(),
            delivery_request: "Leave at the door".to_string(),
        }
    }

    fn request() -> PurchaseRequest {
        PurchaseRequest::new(delivery_info(), DeliveryType::Standard)
    }

    #[test]
    fn valid_request_passes() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn recipient_name_is_bounded_in_characters() {
        let mut req = request();
        req.delivery_info.recipient_name = "가".repeat(100);
        assert!(req.validate().is_ok());

        req.delivery_info.recipient_name = "가".repeat(101);
        let err = req.validate().unwrap_err();
        assert!(matches!(
            err,
            DomainError::Validation {
                field: "recipient_name",
                ..
            }
        ));
    }

    #[test]
    fn delivery_request_is_bounded() {
        let mut req = request();
        req.delivery_info.delivery_request = "x".repeat(501);
        assert!(matches!(
            req.validate(),
            Err(DomainError::Validation {
                field: "delivery_request",
                ..
            })
        ));
    }

    #[test]
    fn address_fields_are_required() {
        for field in ["recipient_name", "phone", "zip_code", "address"] {
            let mut req = request();
            match field {
                "recipient_name" => req.delivery_info.recipient_name = "  ".to_string(),
                "phone" => req.delivery_info.phone.clear(),
                "zip_code" => req.delivery_info.zip_code.clear(),
                _ => req.delivery_info.address.clear(),
            }
            let err = req.validate().unwrap_err();
            assert_eq!(err, DomainError::validation(field, "is required"));
        }
    }

    #[test]
    fn optional_fields_may_be_empty() {
        let mut req = request();
        req.delivery_info.detail_address.clear();
        req.delivery_info.delivery_request.clear();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn phone_rejects_letters() {
        let mut req = request();
        req.delivery_info.phone = "call me".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let json = serde_json::json!({
            "delivery_info": {
                "recipient_name": "Kim",
                "phone": "010-0000-0000",
                "zip_code": "06236",
                "address": "Seoul"
            },
            "delivery_type": "express",
            "applied_coupon": null,
            "total_amount": 1
        });
        assert!(serde_json::from_value::<PurchaseRequest>(json).is_err());
    }

    #[test]
    fn defaults_to_standard_delivery_without_coupon() {
        let json = serde_json::json!({
            "delivery_info": {
                "recipient_name": "Kim",
                "phone": "010-0000-0000",
                "zip_code": "06236",
                "address": "Seoul"
            }
        });
        let req: PurchaseRequest = serde_json::from_value(json).unwrap();
        assert_eq!(req.delivery_type, DeliveryType::Standard);
        assert!(req.applied_coupon.is_none());
    }
}
