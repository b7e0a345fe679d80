use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::chain::Network;

/// Requested next action of a payment (seller-side) request.
///
/// `*Requested` states are claimable by the engine; `*Initiated` means
/// a transaction was built and submission is in flight or awaiting
/// confirmation; `WaitingForManualAction` is the failure terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_action", rename_all = "snake_case")]
pub enum PaymentAction {
    WaitingForExternalAction,
    SubmitResultRequested,
    SubmitResultInitiated,
    WithdrawRequested,
    WithdrawInitiated,
    DenyRefundRequested,
    DenyRefundInitiated,
    WaitingForManualAction,
}

/// Requested next action of a purchase (buyer-side) request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "purchase_action", rename_all = "snake_case")]
pub enum PurchaseAction {
    WaitingForExternalAction,
    RefundRequested,
    RefundInitiated,
    WaitingForManualAction,
}

/// Lifecycle of a registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "registration_state", rename_all = "snake_case")]
pub enum RegistrationState {
    Registered,
    DeregistrationRequested,
    DeregistrationInitiated,
    DeregistrationFailed,
    Deregistered,
}

/// Classification attached to a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "request_error_type", rename_all = "snake_case")]
pub enum RequestErrorType {
    NetworkError,
    InsufficientFunds,
    Unknown,
}

/// On-chain status of a recorded transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    FailedOnChain,
}

/// A configured ledger network + provider + contract set that requests
/// belong to. Read-only for the engine.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentSource {
    pub id: Uuid,
    pub network: Network,
    pub provider_base_url: String,
    pub provider_api_key: String,
    pub builder_url: String,
    pub contract_address: String,
    pub registry_policy_id: String,
}

/// A payment request joined with its signing wallet, as returned by the
/// claim query. The wallet's lock was taken in the same transaction.
#[derive(Debug, Clone, FromRow)]
pub struct ClaimedPayment {
    pub id: Uuid,
    pub blockchain_identifier: String,
    pub buyer_vkey: String,
    pub result_hash: Option<String>,
    pub current_tx_hash: Option<String>,
    pub wallet_id: Uuid,
    pub wallet_address: String,
    pub wallet_vkey: String,
    pub encrypted_secret: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct ClaimedPurchase {
    pub id: Uuid,
    pub blockchain_identifier: String,
    pub seller_vkey: String,
    pub current_tx_hash: Option<String>,
    pub wallet_id: Uuid,
    pub wallet_address: String,
    pub wallet_vkey: String,
    pub encrypted_secret: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct ClaimedRegistry {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub wallet_address: String,
    pub wallet_vkey: String,
    pub encrypted_secret: String,
}

/// Claimed requests of one payment source
#[derive(Debug, Clone)]
pub struct ClaimedBatch<T> {
    pub source: PaymentSource,
    pub requests: Vec<T>,
}

/// Which payment-request predicate a claim uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentClaim {
    /// `SubmitResultRequested` with a result hash present and the
    /// submit window still open (one minute of block-time headroom)
    SubmitResult,
    /// `WithdrawRequested` with the unlock time elapsed
    Withdraw,
    /// `DenyRefundRequested`
    DenyRefund,
}

impl PaymentClaim {
    pub fn requested_action(&self) -> PaymentAction {
        match self {
            PaymentClaim::SubmitResult => PaymentAction::SubmitResultRequested,
            PaymentClaim::Withdraw => PaymentAction::WithdrawRequested,
            PaymentClaim::DenyRefund => PaymentAction::DenyRefundRequested,
        }
    }

    pub fn initiated_action(&self) -> PaymentAction {
        match self {
            PaymentClaim::SubmitResult => PaymentAction::SubmitResultInitiated,
            PaymentClaim::Withdraw => PaymentAction::WithdrawInitiated,
            PaymentClaim::DenyRefund => PaymentAction::DenyRefundInitiated,
        }
    }
}

/// Full wallet row, used by lock bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HotWallet {
    pub id: Uuid,
    pub payment_source_id: Uuid,
    pub address: String,
    pub vkey_hash: String,
    pub encrypted_secret: String,
    pub locked_at: Option<DateTime<Utc>>,
}
