// Generic reconciliation pass: guard, claim, fan out per payment
// source, run per-item operations through the retry orchestrator, and
// fold terminal failures back into the store.
//
// Error isolation is layered: a failing item never aborts its batch
// (the orchestrator returns one outcome per operation), a failing
// source never aborts the pass (sources settle independently), and a
// failing claim logs and no-ops until the next trigger.

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{error, info};

use crate::error::{AppError, AppResult};
use crate::guard::{RunOutcome, SingletonGuard};
use crate::retry::{retry_all, RetryPolicy};
use crate::store::models::{ClaimedBatch, PaymentSource};

/// One reconciliation workflow: the claim predicate, the per-item
/// ledger operation, and the failure transition.
///
/// `submit` owns the success path end to end: it flips the request to
/// its initiated state immediately before handing the transaction to
/// the ledger client, and records the returned hash afterwards, so a
/// crash mid-submission is visible as "in flight" rather than silently
/// re-run from a stale view. The engine only ever applies failures.
#[async_trait]
pub trait Workflow: Send + Sync {
    type Item: Send + Sync;

    fn name(&self) -> &'static str;

    /// Atomically claim eligible requests, grouped by payment source,
    /// with their wallets locked
    async fn claim(&self) -> AppResult<Vec<ClaimedBatch<Self::Item>>>;

    /// Execute the ledger operation for one claimed item; returns the
    /// submitted transaction hash
    async fn submit(&self, source: &PaymentSource, item: &Self::Item) -> AppResult<String>;

    /// Apply the terminal-failure transition for one item: failure
    /// state, error classification and note, wallet lock cleared
    async fn record_failure(&self, item: &Self::Item, error: &AppError) -> AppResult<()>;
}

/// Drives one workflow. Owns the workflow's singleton guard (created
/// at startup, process-wide lifetime) and the shared retry policy.
pub struct WorkflowRunner<W: Workflow> {
    workflow: W,
    guard: SingletonGuard,
    retry: RetryPolicy,
}

impl<W: Workflow> WorkflowRunner<W> {
    pub fn new(workflow: W, retry: RetryPolicy) -> Self {
        let guard = SingletonGuard::new(workflow.name());
        Self {
            workflow,
            guard,
            retry,
        }
    }

    pub fn name(&self) -> &'static str {
        self.workflow.name()
    }

    /// Run one reconciliation pass, or join an in-flight one.
    pub async fn trigger(&self) -> RunOutcome {
        self.guard
            .run(|| async {
                if let Err(e) = self.run_pass().await {
                    // Claim-step failure: nothing was locked, wait for
                    // the next trigger
                    error!("{} pass failed: {}", self.workflow.name(), e);
                }
            })
            .await
    }

    async fn run_pass(&self) -> AppResult<()> {
        let batches = self.workflow.claim().await?;
        if batches.is_empty() {
            return Ok(());
        }

        info!(
            "{}: claimed {} requests across {} payment sources",
            self.workflow.name(),
            batches.iter().map(|b| b.requests.len()).sum::<usize>(),
            batches.len()
        );

        // Settle-all across sources: each batch runs to completion
        // regardless of its siblings' outcomes
        join_all(batches.iter().map(|batch| async move {
            if let Err(e) = self.process_batch(batch).await {
                error!(
                    "{}: batch for payment source {} failed: {}",
                    self.workflow.name(),
                    batch.source.id,
                    e
                );
            }
        }))
        .await;

        Ok(())
    }

    async fn process_batch(&self, batch: &ClaimedBatch<W::Item>) -> AppResult<()> {
        if batch.requests.is_empty() {
            return Ok(());
        }

        let source = &batch.source;
        let operations: Vec<_> = batch
            .requests
            .iter()
            .map(|item| move || self.workflow.submit(source, item))
            .collect();

        let outcomes = retry_all(&self.retry, operations).await;

        // Outcomes come back in claim order; every claimed item leaves
        // the pass progressed or failed, never untouched
        for (item, outcome) in batch.requests.iter().zip(outcomes) {
            if let Err(submit_error) = outcome.result {
                error!(
                    "{}: operation failed after {} attempts: {}",
                    self.workflow.name(),
                    outcome.attempts,
                    submit_error
                );
                if let Err(e) = self.workflow.record_failure(item, &submit_error).await {
                    error!(
                        "{}: recording failure also failed: {}",
                        self.workflow.name(),
                        e
                    );
                }
            }
        }

        Ok(())
    }
}
