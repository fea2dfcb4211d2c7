//! Ledger store: the system of record for per-user credit balances.

use async_trait::async_trait;
use common::{Credits, UserId};
use serde::{Deserialize, Serialize};

use crate::{Result, StoreError};

/// Role of a registered user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(StoreError::Corrupt(format!("unknown role '{other}'"))),
        }
    }
}

/// Snapshot of a user as seen by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub credit_balance: Credits,
    pub role: Role,
}

impl User {
    /// Creates a regular user with an opening balance.
    pub fn new(id: UserId, credit_balance: Credits) -> Self {
        Self {
            id,
            credit_balance,
            role: Role::User,
        }
    }
}

/// Per-user credit balances with conditional mutation.
///
/// Every mutation is a single atomic step: implementations must never
/// read a balance and write it back in two separate operations.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Returns the user snapshot, failing with `NotFound` if unknown.
    async fn get_user(&self, user_id: UserId) -> Result<User>;

    /// Returns the current balance, failing with `NotFound` if unknown.
    async fn get_balance(&self, user_id: UserId) -> Result<Credits> {
        Ok(self.get_user(user_id).await?.credit_balance)
    }

    /// Subtracts `amount` only if the balance covers it, returning the new balance.
    ///
    /// Fails with `InsufficientFunds` and leaves the balance untouched otherwise.
    async fn debit(&self, user_id: UserId, amount: Credits) -> Result<Credits>;

    /// Adds `amount` to a known user's balance, returning the new balance.
    async fn credit(&self, user_id: UserId, amount: Credits) -> Result<Credits>;
}

pub(crate) fn ensure_valid_amount(amount: Credits) -> Result<()> {
    if amount.is_negative() {
        return Err(StoreError::InvalidAmount(amount));
    }
    Ok(())
}
