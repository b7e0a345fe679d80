// Settlement reconciliation: the generic pass engine plus one module
// per workflow.
pub mod collect;
pub mod deny;
pub mod deregister;
pub mod engine;
pub mod refund;
pub mod scheduler;
pub mod submit_result;

#[cfg(test)]
pub mod testutil;

use std::sync::Arc;

use crate::chain::client::LedgerClient;
use crate::chain::Utxo;
use crate::error::{AppError, AppResult, ChainError};
use crate::secrets::SecretStore;
use crate::store::models::RequestErrorType;

/// Map a terminal submission error to the classification stored on the
/// failed request. Transient infrastructure errors that exhausted their
/// retries land as NetworkError; explicit fund shortfalls keep their
/// own bucket; everything else is Unknown and needs operator eyes.
pub fn classify_error(error: &AppError) -> RequestErrorType {
    match error {
        AppError::Chain(ChainError::Provider(_))
        | AppError::Chain(ChainError::Timeout(_))
        | AppError::Chain(ChainError::EmptyWallet) => RequestErrorType::NetworkError,
        AppError::Chain(ChainError::InsufficientFunds(_)) => RequestErrorType::InsufficientFunds,
        _ => RequestErrorType::Unknown,
    }
}

/// Decrypted signing material plus the wallet's spendable UTxOs, built
/// once per operation attempt so a retry sees a fresh ledger view.
pub struct SignerContext {
    pub mnemonic: String,
    pub address: String,
    pub utxos: Vec<Utxo>,
}

pub async fn materialize_signer(
    secrets: &Arc<dyn SecretStore>,
    client: &Arc<dyn LedgerClient>,
    address: &str,
    encrypted_secret: &str,
) -> AppResult<SignerContext> {
    let mnemonic = secrets.decrypt(encrypted_secret)?;
    let utxos = client.fetch_spendable_utxos(address).await?;
    if utxos.is_empty() {
        return Err(AppError::Chain(ChainError::EmptyWallet));
    }
    Ok(SignerContext {
        mnemonic,
        address: address.to_string(),
        utxos,
    })
}

/// Locate the escrow UTxO carrying the request's datum among the
/// outputs of the transaction that last touched it.
pub async fn find_escrow_utxo(
    client: &Arc<dyn LedgerClient>,
    tx_hash: Option<&str>,
    contract_address: &str,
) -> AppResult<Utxo> {
    let tx_hash =
        tx_hash.ok_or(AppError::Chain(ChainError::MissingTransactionHash))?;
    let outputs = client.fetch_transaction_utxos(tx_hash).await?;
    outputs
        .into_iter()
        .find(|u| u.address == contract_address && u.inline_datum.is_some())
        .ok_or_else(|| {
            AppError::Chain(ChainError::UtxoNotFound(format!(
                "no contract output with datum in tx {}",
                tx_hash
            )))
        })
}
