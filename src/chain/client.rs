// Ledger client contract and the provider-backed implementation.
//
// The engine consumes three operations: UTXO fetch by address, UTXO
// fetch by transaction, and build-and-submit of one business intent.
// Everything below the intent (fee balancing, signing, CBOR assembly)
// belongs to the provider side of the contract.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::chain::{Network, Utxo, ValidityWindow};
use crate::error::ChainError;
use crate::store::models::PaymentSource;

/// One ledger-mutating business intent, ready to build and submit
#[derive(Debug, Clone, Serialize)]
pub struct TransactionIntent {
    pub network: Network,
    /// Decrypted signing mnemonic; materialized for this one operation
    /// and never written back anywhere by the engine
    pub signing_mnemonic: String,
    pub change_address: String,
    /// Metadata label 674 message lines
    pub metadata_message: Vec<String>,
    pub validity: ValidityWindow,
    pub kind: IntentKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntentKind {
    /// Redeem the escrow output and re-lock it with a new datum
    RelockEscrow {
        contract_address: String,
        escrow_utxo: Utxo,
        redeemer: Value,
        new_datum: Value,
    },
    /// Redeem the escrow output and pay its value out
    SpendEscrow {
        contract_address: String,
        escrow_utxo: Utxo,
        redeemer: Value,
        pay_to: String,
    },
    /// Burn one registry token
    BurnRegistryToken {
        policy_id: String,
        asset_name: String,
        redeemer: Value,
        inputs: Vec<Utxo>,
    },
}

/// Contract the reconciliation engine expects from the ledger side
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Spendable UTXOs currently sitting at `address`
    async fn fetch_spendable_utxos(&self, address: &str) -> Result<Vec<Utxo>, ChainError>;

    /// Outputs produced by an already-known transaction
    async fn fetch_transaction_utxos(&self, tx_hash: &str) -> Result<Vec<Utxo>, ChainError>;

    /// Build, sign, and submit a transaction for one intent; returns
    /// the transaction hash
    async fn build_and_submit(&self, intent: &TransactionIntent) -> Result<String, ChainError>;
}

/// Builds one ledger client per payment source configuration
pub trait LedgerClientFactory: Send + Sync {
    fn for_source(&self, source: &PaymentSource) -> Arc<dyn LedgerClient>;
}

/// Production factory: one provider client per source, configured from
/// the source row
pub struct ProviderClientFactory;

impl LedgerClientFactory for ProviderClientFactory {
    fn for_source(&self, source: &PaymentSource) -> Arc<dyn LedgerClient> {
        Arc::new(ProviderLedgerClient::new(
            source.provider_base_url.clone(),
            source.provider_api_key.clone(),
            source.builder_url.clone(),
        ))
    }
}

/// Blockfrost-compatible provider client.
///
/// UTXO queries go straight to the provider REST API; build-and-submit
/// goes to the payment source's transaction-builder endpoint, a trusted
/// sidecar colocated with the engine.
pub struct ProviderLedgerClient {
    http: reqwest::Client,
    base_url: String,
    project_id: String,
    builder_url: String,
}

impl ProviderLedgerClient {
    pub fn new(base_url: String, project_id: String, builder_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id,
            builder_url: builder_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json(&self, path: &str) -> Result<Value, ChainError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .header("project_id", &self.project_id)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            // The provider answers 404 for addresses with no history
            StatusCode::NOT_FOUND => Ok(Value::Array(vec![])),
            status => Err(ChainError::Provider(format!(
                "{} returned {}",
                path, status
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProviderUtxo {
    tx_hash: String,
    output_index: u32,
    address: String,
    amount: Vec<crate::chain::AssetAmount>,
    #[serde(default)]
    inline_datum: Option<Value>,
}

impl From<ProviderUtxo> for Utxo {
    fn from(u: ProviderUtxo) -> Self {
        Utxo {
            tx_hash: u.tx_hash,
            output_index: u.output_index,
            address: u.address,
            amount: u.amount,
            inline_datum: u.inline_datum,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TxUtxosResponse {
    outputs: Vec<TxOutput>,
}

#[derive(Debug, Deserialize)]
struct TxOutput {
    output_index: u32,
    address: String,
    amount: Vec<crate::chain::AssetAmount>,
    #[serde(default)]
    inline_datum: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct BuilderResponse {
    tx_hash: String,
}

#[async_trait]
impl LedgerClient for ProviderLedgerClient {
    async fn fetch_spendable_utxos(&self, address: &str) -> Result<Vec<Utxo>, ChainError> {
        let value = self
            .get_json(&format!("/addresses/{}/utxos", address))
            .await?;

        let utxos: Vec<ProviderUtxo> = serde_json::from_value(value)
            .map_err(|e| ChainError::Provider(format!("bad utxo payload: {}", e)))?;

        Ok(utxos.into_iter().map(Utxo::from).collect())
    }

    async fn fetch_transaction_utxos(&self, tx_hash: &str) -> Result<Vec<Utxo>, ChainError> {
        let value = self.get_json(&format!("/txs/{}/utxos", tx_hash)).await?;

        let parsed: TxUtxosResponse = serde_json::from_value(value)
            .map_err(|e| ChainError::Provider(format!("bad tx utxo payload: {}", e)))?;

        Ok(parsed
            .outputs
            .into_iter()
            .map(|o| Utxo {
                tx_hash: tx_hash.to_string(),
                output_index: o.output_index,
                address: o.address,
                amount: o.amount,
                inline_datum: o.inline_datum,
            })
            .collect())
    }

    async fn build_and_submit(&self, intent: &TransactionIntent) -> Result<String, ChainError> {
        let url = format!("{}/tx/build-and-submit", self.builder_url);

        let response = self.http.post(&url).json(intent).send().await?;

        match response.status() {
            StatusCode::OK => {
                let built: BuilderResponse = response
                    .json()
                    .await
                    .map_err(|e| ChainError::Provider(format!("bad builder payload: {}", e)))?;
                Ok(built.tx_hash)
            }
            StatusCode::BAD_REQUEST => {
                let body = response.text().await.unwrap_or_default();
                // The builder rejects underfunded or malformed intents
                // outright; retrying cannot help
                if body.contains("insufficient") {
                    Err(ChainError::InsufficientFunds(body))
                } else {
                    Err(ChainError::Rejected(body))
                }
            }
            status => Err(ChainError::Provider(format!(
                "builder returned {}",
                status
            ))),
        }
    }
}
