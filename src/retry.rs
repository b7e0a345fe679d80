// Retry orchestrator - fan-out with independent per-operation retry.
//
// Ledger submission is flaky (node availability, UTXO contention,
// transient provider errors), but each item's eligibility to retry is
// independent of its siblings'. All operations run concurrently; a
// permanently failing one never cancels or delays the others.

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use tracing::warn;

use crate::error::AppResult;

/// Delay-based backoff policy with a capped attempt count
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt, so `max_retries + 1` total attempts
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(500),
            backoff_multiplier: 5,
            max_delay: Duration::from_millis(7500),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.saturating_pow(retry.saturating_sub(1));
        let delay = self.initial_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

/// One outcome per submitted operation, in input order
#[derive(Debug)]
pub struct OperationOutcome<T> {
    pub result: AppResult<T>,
    /// Total attempts made, including the first
    pub attempts: u32,
}

impl<T> OperationOutcome<T> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Execute all operations concurrently, retrying each failing one on
/// its own schedule until it succeeds, exhausts the policy, or fails
/// with a non-retryable error.
///
/// Performs no business-state mutation; callers interpret outcomes.
pub async fn retry_all<T, F, Fut>(
    policy: &RetryPolicy,
    operations: Vec<F>,
) -> Vec<OperationOutcome<T>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    join_all(
        operations
            .into_iter()
            .map(|operation| retry_one(policy, operation)),
    )
    .await
}

async fn retry_one<T, F, Fut>(policy: &RetryPolicy, operation: F) -> OperationOutcome<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempts = 0;

    loop {
        attempts += 1;
        match operation().await {
            Ok(value) => {
                return OperationOutcome {
                    result: Ok(value),
                    attempts,
                }
            }
            Err(error) => {
                let retries_used = attempts - 1;
                if !error.is_retryable() || retries_used >= policy.max_retries {
                    return OperationOutcome {
                        result: Err(error),
                        attempts,
                    };
                }

                let delay = policy.delay_for(attempts);
                warn!(
                    "Operation failed (attempt {}/{}), retrying in {:?}: {}",
                    attempts,
                    policy.max_retries + 1,
                    delay,
                    error
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
