//! In-flight settlement tracking.

use common::{ProductId, UserId};

use crate::error::SettlementError;
use crate::state::SettlementState;

/// The progress of one purchase through the settlement steps.
///
/// Tracks which steps completed so a failure can compensate them in reverse.
#[derive(Debug, Clone)]
pub struct SettlementAttempt {
    buyer_id: UserId,
    product_id: ProductId,
    state: SettlementState,
    completed_steps: Vec<&'static str>,
    failure_reason: Option<String>,
}

impl SettlementAttempt {
    pub fn new(buyer_id: UserId, product_id: ProductId) -> Self {
        Self {
            buyer_id,
            product_id,
            state: SettlementState::Initiated,
            completed_steps: Vec::new(),
            failure_reason: None,
        }
    }

    /// Records `step` as done and moves to `next`.
    pub fn complete_step(
        &mut self,
        step: &'static str,
        next: SettlementState,
    ) -> Result<(), SettlementError> {
        self.transition(next)?;
        self.completed_steps.push(step);
        Ok(())
    }

    /// Moves to `next` without recording a completed step.
    pub fn skip_to(&mut self, next: SettlementState) -> Result<(), SettlementError> {
        self.transition(next)
    }

    /// Marks the attempt failed.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), SettlementError> {
        self.transition(SettlementState::Failed)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    fn transition(&mut self, next: SettlementState) -> Result<(), SettlementError> {
        if !self.state.can_transition_to(next) {
            return Err(SettlementError::InvalidState {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(
            buyer_id = %self.buyer_id,
            product_id = %self.product_id,
            from = %self.state,
            to = %next,
            "settlement state transition"
        );
        self.state = next;
        Ok(())
    }
}

// Query methods
impl SettlementAttempt {
    pub fn state(&self) -> SettlementState {
        self.state
    }

    pub fn buyer_id(&self) -> UserId {
        self.buyer_id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    /// Returns the completed step names in commit order.
    pub fn completed_steps(&self) -> &[&'static str] {
        &self.completed_steps
    }

    pub fn has_completed(&self, step: &str) -> bool {
        self.completed_steps.contains(&step)
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::{STEP_DEBIT, STEP_RESERVE};

    fn attempt() -> SettlementAttempt {
        SettlementAttempt::new(UserId::new(), ProductId::new())
    }

    #[test]
    fn test_records_completed_steps_in_order() {
        let mut attempt = attempt();
        attempt
            .complete_step(STEP_RESERVE, SettlementState::Reserved)
            .unwrap();
        attempt
            .complete_step(STEP_DEBIT, SettlementState::Debited)
            .unwrap();

        assert_eq!(attempt.state(), SettlementState::Debited);
        assert_eq!(attempt.completed_steps(), &[STEP_RESERVE, STEP_DEBIT]);
        assert!(attempt.has_completed(STEP_RESERVE));
    }

    #[test]
    fn test_rejects_out_of_order_step() {
        let mut attempt = attempt();
        let err = attempt
            .complete_step(STEP_DEBIT, SettlementState::Debited)
            .unwrap_err();
        assert!(matches!(
            err,
            SettlementError::InvalidState {
                from: SettlementState::Initiated,
                to: SettlementState::Debited
            }
        ));
        assert!(attempt.completed_steps().is_empty());
    }

    #[test]
    fn test_fail_records_reason_once() {
        let mut attempt = attempt();
        attempt
            .complete_step(STEP_RESERVE, SettlementState::Reserved)
            .unwrap();
        attempt.fail("debit rejected").unwrap();

        assert_eq!(attempt.state(), SettlementState::Failed);
        assert_eq!(attempt.failure_reason(), Some("debit rejected"));
        assert!(attempt.fail("again").is_err());
    }
}
