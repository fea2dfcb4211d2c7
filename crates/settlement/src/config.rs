//! Settlement coordinator configuration.

use std::time::Duration;

use crate::retry::RetryConfig;

/// Tuning knobs for a [`crate::SettlementCoordinator`].
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementConfig {
    /// Deadline for reaching the debit. Once the buyer is charged the
    /// attempt always runs to completion.
    pub settlement_timeout: Duration,
    /// Retry policy applied to every store call.
    pub retry: RetryConfig,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            settlement_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
        }
    }
}

impl SettlementConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.settlement_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}
