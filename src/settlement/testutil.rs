// Shared fixtures for workflow handler tests: a scriptable ledger
// client and canned store rows.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::chain::client::{LedgerClient, LedgerClientFactory, TransactionIntent};
use crate::chain::{AssetAmount, Network, Utxo};
use crate::error::ChainError;
use crate::store::models::PaymentSource;

pub fn fast_retry() -> crate::retry::RetryPolicy {
    crate::retry::RetryPolicy {
        max_retries: 1,
        initial_delay: std::time::Duration::from_millis(1),
        backoff_multiplier: 1,
        max_delay: std::time::Duration::from_millis(1),
    }
}

pub fn test_secrets() -> Arc<crate::secrets::TaggedSecretStore> {
    Arc::new(crate::secrets::TaggedSecretStore::new(
        "unit-test-encryption-key-material".into(),
    ))
}

pub fn test_source() -> PaymentSource {
    PaymentSource {
        id: Uuid::new_v4(),
        network: Network::Preprod,
        provider_base_url: "http://provider.test".into(),
        provider_api_key: "proj_test".into(),
        builder_url: "http://builder.test".into(),
        contract_address: "addr_test1contract".into(),
        registry_policy_id: "ab".repeat(28),
    }
}

pub fn wallet_utxo(address: &str) -> Utxo {
    Utxo {
        tx_hash: "11".repeat(32),
        output_index: 0,
        address: address.into(),
        amount: vec![AssetAmount {
            unit: "lovelace".into(),
            quantity: "10000000".into(),
        }],
        inline_datum: None,
    }
}

pub fn escrow_utxo(contract_address: &str, datum: Value) -> Utxo {
    Utxo {
        tx_hash: "22".repeat(32),
        output_index: 1,
        address: contract_address.into(),
        amount: vec![AssetAmount {
            unit: "lovelace".into(),
            quantity: "5000000".into(),
        }],
        inline_datum: Some(datum),
    }
}

/// Ledger client whose responses are fixed up front. Records every
/// submitted intent; `fail_submissions` makes build_and_submit fail
/// with a transient provider error instead.
pub struct MockLedger {
    pub spendable: Vec<Utxo>,
    pub tx_outputs: Vec<Utxo>,
    pub submitted: Mutex<Vec<TransactionIntent>>,
    pub fail_submissions: bool,
}

impl MockLedger {
    pub fn new(spendable: Vec<Utxo>, tx_outputs: Vec<Utxo>) -> Self {
        Self {
            spendable,
            tx_outputs,
            submitted: Mutex::new(Vec::new()),
            fail_submissions: false,
        }
    }

    pub fn failing(spendable: Vec<Utxo>, tx_outputs: Vec<Utxo>) -> Self {
        Self {
            fail_submissions: true,
            ..Self::new(spendable, tx_outputs)
        }
    }

    pub fn submissions(&self) -> Vec<TransactionIntent> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn fetch_spendable_utxos(&self, _address: &str) -> Result<Vec<Utxo>, ChainError> {
        Ok(self.spendable.clone())
    }

    async fn fetch_transaction_utxos(&self, _tx_hash: &str) -> Result<Vec<Utxo>, ChainError> {
        Ok(self.tx_outputs.clone())
    }

    async fn build_and_submit(&self, intent: &TransactionIntent) -> Result<String, ChainError> {
        if self.fail_submissions {
            return Err(ChainError::Provider("node unreachable".into()));
        }
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(intent.clone());
        Ok(format!("deadbeef{:056x}", submitted.len()))
    }
}

/// Factory that hands every source the same mock client
pub struct MockFactory(pub Arc<MockLedger>);

impl LedgerClientFactory for MockFactory {
    fn for_source(&self, _source: &PaymentSource) -> Arc<dyn LedgerClient> {
        self.0.clone()
    }
}
