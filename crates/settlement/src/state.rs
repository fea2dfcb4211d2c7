//! Settlement state machine.

use serde::{Deserialize, Serialize};

/// The state of a settlement attempt.
///
/// State transitions:
/// ```text
/// Initiated ──► Reserved ──► Debited ──► Credited ──┬──► CouponRedeemed ──┬──► Logged
///     │             │                               └──► CouponSkipped ───┘
///     └─────────────┴──► Failed
/// ```
///
/// Every non-terminal state may also move to `Failed`, but the coordinator
/// never fails an attempt once the buyer has been debited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SettlementState {
    #[default]
    Initiated,

    /// The product is marked sold to the buyer.
    Reserved,

    /// The buyer has been charged.
    Debited,

    /// The seller credit succeeded or was queued for reconciliation.
    Credited,

    CouponRedeemed,

    /// No coupon was applied, or its redemption was deferred.
    CouponSkipped,

    /// The transaction record exists or was queued (terminal state).
    Logged,

    /// Compensation finished after a failure (terminal state).
    Failed,
}

impl SettlementState {
    /// Returns true if the attempt may move from `self` to `next`.
    pub fn can_transition_to(&self, next: SettlementState) -> bool {
        use SettlementState::*;

        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Initiated, Reserved)
                | (Reserved, Debited)
                | (Debited, Credited)
                | (Credited, CouponRedeemed)
                | (Credited, CouponSkipped)
                | (CouponRedeemed, Logged)
                | (CouponSkipped, Logged)
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SettlementState::Logged | SettlementState::Failed)
    }

    /// Returns true once the buyer has been charged.
    pub fn is_committed(&self) -> bool {
        !matches!(
            self,
            SettlementState::Initiated | SettlementState::Reserved | SettlementState::Failed
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementState::Initiated => "Initiated",
            SettlementState::Reserved => "Reserved",
            SettlementState::Debited => "Debited",
            SettlementState::Credited => "Credited",
            SettlementState::CouponRedeemed => "CouponRedeemed",
            SettlementState::CouponSkipped => "CouponSkipped",
            SettlementState::Logged => "Logged",
            SettlementState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SettlementState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
