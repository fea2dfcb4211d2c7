use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random ID.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an ID from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }

            /// Parses an ID from its hyphenated string form.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a registered user (buyer or seller).
    UserId
);

uuid_id!(
    /// Unique identifier for a product listing.
    ProductId
);

uuid_id!(
    /// Unique identifier for a globally defined coupon.
    CouponId
);

uuid_id!(
    /// Unique identifier for a coupon issued to one user.
    UserCouponId
);

uuid_id!(
    /// Unique identifier for a settled transaction.
    TransactionId
);

/// A credit amount in whole units.
///
/// Balances, prices, fees and discounts are all whole credits, so integer
/// arithmetic gives exact `floor` semantics for percentage discounts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Credits(i64);

impl Credits {
    /// Creates an amount from whole credits.
    pub const fn new(units: i64) -> Self {
        Self(units)
    }

    /// Returns zero credits.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in whole credits.
    pub const fn units(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Adds two amounts, returning `None` on overflow.
    pub fn checked_add(self, other: Credits) -> Option<Credits> {
        self.0.checked_add(other.0).map(Credits)
    }

    /// Subtracts an amount, returning `None` on overflow.
    pub fn checked_sub(self, other: Credits) -> Option<Credits> {
        self.0.checked_sub(other.0).map(Credits)
    }

    /// Returns `floor(self * percent / 100)` for non-negative operands.
    ///
    /// The product is computed in 128 bits so large prices cannot overflow.
    pub fn percent_floor(self, percent: i64) -> Credits {
        let scaled = i128::from(self.0) * i128::from(percent);
        let floored = scaled.div_euclid(100);
        Credits(i64::try_from(floored).unwrap_or(i64::MAX))
    }

    /// Clamps negative amounts to zero.
    pub fn non_negative(self) -> Credits {
        Credits(self.0.max(0))
    }
}

impl std::fmt::Display for Credits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} credits", self.0)
    }
}

impl From<i64> for Credits {
    fn from(units: i64) -> Self {
        Self(units)
    }
}

impl std::ops::Add for Credits {
    type Output = Credits;

    fn add(self, rhs: Self) -> Self::Output {
        Credits(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Credits {
    type Output = Credits;

    fn sub(self, rhs: Self) -> Self::Output {
        Credits(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Credits {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::ops::SubAssign for Credits {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(UserId::new(), UserId::new());
        assert_ne!(ProductId::new(), ProductId::new());
    }

    #[test]
    fn id_from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        let id = TransactionId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), uuid);
        assert_eq!(Uuid::from(id), uuid);
    }

    #[test]
    fn id_parse_accepts_display_output() {
        let id = UserCouponId::new();
        let parsed = UserCouponId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert!(UserCouponId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn id_serializes_as_plain_string() {
        let id = CouponId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }

    #[test]
    fn credits_arithmetic() {
        let a = Credits::new(50_000);
        let b = Credits::new(3_000);
        assert_eq!((a + b).units(), 53_000);
        assert_eq!((a - b).units(), 47_000);

        let mut c = a;
        c += b;
        c -= Credits::new(1_000);
        assert_eq!(c.units(), 52_000);
    }

    #[test]
    fn credits_checked_ops_detect_overflow() {
        assert_eq!(Credits::new(i64::MAX).checked_add(Credits::new(1)), None);
        assert_eq!(
            Credits::new(10).checked_sub(Credits::new(4)),
            Some(Credits::new(6))
        );
    }

    #[test]
    fn percent_floor_rounds_down() {
        assert_eq!(Credits::new(50_000).percent_floor(10), Credits::new(5_000));
        assert_eq!(Credits::new(999).percent_floor(15), Credits::new(149));
        assert_eq!(Credits::new(1).percent_floor(50), Credits::zero());
        assert_eq!(
            Credits::new(i64::MAX).percent_floor(100),
            Credits::new(i64::MAX)
        );
    }

    #[test]
    fn non_negative_clamps() {
        assert_eq!(Credits::new(-5).non_negative(), Credits::zero());
        assert_eq!(Credits::new(5).non_negative(), Credits::new(5));
    }

    #[test]
    fn credits_display_and_serde() {
        assert_eq!(Credits::new(47_000).to_string(), "47000 credits");
        let json = serde_json::to_string(&Credits::new(48_000)).unwrap();
        assert_eq!(json, "48000");
        let back: Credits = serde_json::from_str("48000").unwrap();
        assert_eq!(back, Credits::new(48_000));
    }
}
