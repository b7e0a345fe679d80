// Persistence layer: the durable table of work items plus the
// per-wallet advisory lock.

pub mod models;
pub mod repository;

#[cfg(test)]
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;
use models::{
    ClaimedBatch, ClaimedPayment, ClaimedPurchase, ClaimedRegistry, PaymentAction, PaymentClaim,
    PurchaseAction, RegistrationState, RequestErrorType,
};

pub use repository::PgSettlementStore;

/// Transactional store contract the reconciliation engine consumes.
///
/// Claim operations are atomic read-and-lock: matching requests are
/// selected and their wallets' `locked_at` stamped in one transaction,
/// skipping wallets whose lock is fresher than the staleness window.
/// An empty result is not an error.
///
/// `fail_*` operations set the workflow's failure terminal, attach the
/// error note, and clear the wallet lock in one round trip, so a failed
/// item can never leave its wallet dangling.
#[async_trait]
pub trait SettlementStore: Send + Sync {
    async fn claim_payment_requests(
        &self,
        claim: PaymentClaim,
        staleness: Duration,
    ) -> AppResult<Vec<ClaimedBatch<ClaimedPayment>>>;

    async fn claim_purchase_requests(
        &self,
        staleness: Duration,
    ) -> AppResult<Vec<ClaimedBatch<ClaimedPurchase>>>;

    async fn claim_registry_requests(
        &self,
        staleness: Duration,
    ) -> AppResult<Vec<ClaimedBatch<ClaimedRegistry>>>;

    async fn mark_payment_initiated(
        &self,
        request_id: Uuid,
        action: PaymentAction,
    ) -> AppResult<()>;

    async fn record_payment_transaction(
        &self,
        request_id: Uuid,
        wallet_id: Uuid,
        tx_hash: &str,
    ) -> AppResult<()>;

    async fn fail_payment_request(
        &self,
        request_id: Uuid,
        error_type: RequestErrorType,
        note: &str,
    ) -> AppResult<()>;

    async fn mark_purchase_initiated(
        &self,
        request_id: Uuid,
        action: PurchaseAction,
    ) -> AppResult<()>;

    async fn record_purchase_transaction(
        &self,
        request_id: Uuid,
        wallet_id: Uuid,
        tx_hash: &str,
    ) -> AppResult<()>;

    async fn fail_purchase_request(
        &self,
        request_id: Uuid,
        error_type: RequestErrorType,
        note: &str,
    ) -> AppResult<()>;

    async fn mark_registry_state(
        &self,
        request_id: Uuid,
        state: RegistrationState,
    ) -> AppResult<()>;

    async fn record_registry_transaction(
        &self,
        request_id: Uuid,
        wallet_id: Uuid,
        tx_hash: &str,
    ) -> AppResult<()>;

    async fn fail_registry_request(&self, request_id: Uuid, note: &str) -> AppResult<()>;

    async fn release_wallet_lock(&self, wallet_id: Uuid) -> AppResult<()>;
}
