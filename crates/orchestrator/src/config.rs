use std::time::Duration;

use crate::RetryPolicy;

/// Tuning for calls across the inventory boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Deadline for a single inventory call.
    pub call_timeout: Duration,
    /// Retry policy for transport failures and timeouts.
    pub retry: RetryPolicy,
    /// Read-validate-decrement rounds per line before a lost race is
    /// reported as insufficient stock.
    pub reservation_attempts: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(2),
            retry: RetryPolicy::default(),
            reservation_attempts: 3,
        }
    }
}
