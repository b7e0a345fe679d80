// Deregister workflow: burn the agent's registry token from its hot
// wallet, removing the listing from the on-chain registry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::chain::client::{IntentKind, LedgerClientFactory, TransactionIntent};
use crate::chain::datum::MintRedeemer;
use crate::chain::{registry_asset_name, ValidityWindow};
use crate::error::{error_note, AppError, AppResult, ChainError};
use crate::secrets::SecretStore;
use crate::settlement::engine::Workflow;
use crate::settlement::materialize_signer;
use crate::store::models::{ClaimedBatch, ClaimedRegistry, PaymentSource, RegistrationState};
use crate::store::SettlementStore;

pub struct DeregisterWorkflow {
    store: Arc<dyn SettlementStore>,
    secrets: Arc<dyn SecretStore>,
    clients: Arc<dyn LedgerClientFactory>,
    wallet_lock_staleness: Duration,
}

impl DeregisterWorkflow {
    pub fn new(
        store: Arc<dyn SettlementStore>,
        secrets: Arc<dyn SecretStore>,
        clients: Arc<dyn LedgerClientFactory>,
        wallet_lock_staleness: Duration,
    ) -> Self {
        Self {
            store,
            secrets,
            clients,
            wallet_lock_staleness,
        }
    }
}

#[async_trait]
impl Workflow for DeregisterWorkflow {
    type Item = ClaimedRegistry;

    fn name(&self) -> &'static str {
        "deregister"
    }

    async fn claim(&self) -> AppResult<Vec<ClaimedBatch<ClaimedRegistry>>> {
        self.store
            .claim_registry_requests(self.wallet_lock_staleness)
            .await
    }

    async fn submit(&self, source: &PaymentSource, item: &ClaimedRegistry) -> AppResult<String> {
        let client = self.clients.for_source(source);
        let signer = materialize_signer(
            &self.secrets,
            &client,
            &item.wallet_address,
            &item.encrypted_secret,
        )
        .await?;

        // The token name is re-derived from the UTXO carrying it:
        // hash over the carrying transaction id and output index, the
        // same derivation the mint used
        let token_utxo = signer
            .utxos
            .iter()
            .find(|u| {
                u.amount
                    .iter()
                    .any(|a| a.unit.starts_with(&source.registry_policy_id))
            })
            .cloned()
            .ok_or_else(|| {
                AppError::Chain(ChainError::UtxoNotFound(format!(
                    "no registry token under policy {} in wallet {}",
                    source.registry_policy_id, item.wallet_address
                )))
            })?;
        let asset_name = registry_asset_name(&token_utxo)?;

        self.store
            .mark_registry_state(item.id, RegistrationState::DeregistrationInitiated)
            .await?;

        let intent = TransactionIntent {
            network: source.network,
            signing_mnemonic: signer.mnemonic,
            change_address: signer.address,
            metadata_message: vec!["Registry".into(), "Deregister".into()],
            validity: ValidityWindow::around(source.network, Utc::now()),
            kind: IntentKind::BurnRegistryToken {
                policy_id: source.registry_policy_id.clone(),
                asset_name,
                redeemer: MintRedeemer::Burn.to_plutus(),
                inputs: vec![token_utxo],
            },
        };

        let tx_hash = client.build_and_submit(&intent).await?;
        self.store
            .record_registry_transaction(item.id, item.wallet_id, &tx_hash)
            .await?;

        info!(
            "deregister: registry entry {} burn submitted, https://{}/transaction/{}",
            item.id,
            source.network.explorer_host(),
            tx_hash
        );
        Ok(tx_hash)
    }

    async fn record_failure(&self, item: &ClaimedRegistry, error: &AppError) -> AppResult<()> {
        self.store
            .fail_registry_request(item.id, &error_note("deregistration failed", error))
            .await
    }
}
