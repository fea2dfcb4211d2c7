//! Work deferred after the buyer was charged.
//!
//! Once DEBIT succeeds a settlement never rolls back. A later step that stays
//! unavailable after retries is recorded here and replayed by
//! [`crate::SettlementCoordinator::reconcile`].

use std::sync::Arc;

use common::{Credits, ProductId, TransactionId, UserCouponId, UserId};
use serde::Serialize;
use store::Transaction;
use tokio::sync::Mutex;

/// A store write still owed by an earlier settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PendingAction {
    /// A failed attempt could not release its reservation.
    ReleaseReservation {
        product_id: ProductId,
        buyer_id: UserId,
    },

    /// The seller was not paid for a settled purchase.
    SellerCredit {
        transaction_id: TransactionId,
        seller_id: UserId,
        amount: Credits,
    },

    /// The applied coupon was not marked used.
    CouponRedemption {
        transaction_id: TransactionId,
        user_coupon_id: UserCouponId,
    },

    /// The transaction record was not written.
    TransactionAppend { transaction: Box<Transaction> },
}

impl PendingAction {
    /// Short label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PendingAction::ReleaseReservation { .. } => "release_reservation",
            PendingAction::SellerCredit { .. } => "seller_credit",
            PendingAction::CouponRedemption { .. } => "coupon_redemption",
            PendingAction::TransactionAppend { .. } => "transaction_append",
        }
    }
}

/// FIFO queue of pending actions shared by all clones of a coordinator.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationQueue {
    pending: Arc<Mutex<Vec<PendingAction>>>,
}

impl ReconciliationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, action: PendingAction) {
        metrics::counter!("settlement_reconciliation_queued_total", "action" => action.kind())
            .increment(1);
        tracing::error!(action = action.kind(), ?action, "queued for reconciliation");
        self.pending.lock().await.push(action);
    }

    /// Puts back an action whose replay failed.
    pub async fn requeue(&self, action: PendingAction) {
        self.pending.lock().await.push(action);
    }

    /// Removes and returns everything queued so far.
    pub async fn drain(&self) -> Vec<PendingAction> {
        std::mem::take(&mut *self.pending.lock().await)
    }

    pub async fn snapshot(&self) -> Vec<PendingAction> {
        self.pending.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credit(amount: i64) -> PendingAction {
        PendingAction::SellerCredit {
            transaction_id: TransactionId::new(),
            seller_id: UserId::new(),
            amount: Credits::new(amount),
        }
    }

    #[tokio::test]
    async fn test_drain_empties_in_order() {
        let queue = ReconciliationQueue::new();
        let first = credit(1);
        let second = credit(2);
        queue.push(first.clone()).await;
        queue.push(second.clone()).await;

        assert_eq!(queue.snapshot().await.len(), 2);
        assert_eq!(queue.drain().await, vec![first, second]);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_clones_share_the_queue() {
        let queue = ReconciliationQueue::new();
        let other = queue.clone();
        other.push(credit(5)).await;
        assert_eq!(queue.len().await, 1);
    }

    #[test]
    fn test_serializes_with_action_tag() {
        let action = PendingAction::ReleaseReservation {
            product_id: ProductId::new(),
            buyer_id: UserId::new(),
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["action"], "release_reservation");
        assert_eq!(action.kind(), "release_reservation");
    }
}
