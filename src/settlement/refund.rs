// Refund workflow: buyer raises a refund request against the escrow,
// re-locking it with the refund flag set. Runs against purchase
// requests and signs with the buying wallet.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::chain::client::{IntentKind, LedgerClientFactory, TransactionIntent};
use crate::chain::datum::{EscrowDatum, SpendRedeemer};
use crate::chain::ValidityWindow;
use crate::error::{error_note, AppError, AppResult, ChainError};
use crate::secrets::SecretStore;
use crate::settlement::engine::Workflow;
use crate::settlement::{classify_error, find_escrow_utxo, materialize_signer};
use crate::store::models::{ClaimedBatch, ClaimedPurchase, PaymentSource, PurchaseAction};
use crate::store::SettlementStore;

pub struct RefundWorkflow {
    store: Arc<dyn SettlementStore>,
    secrets: Arc<dyn SecretStore>,
    clients: Arc<dyn LedgerClientFactory>,
    wallet_lock_staleness: Duration,
}

impl RefundWorkflow {
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
impl Workflow for RefundWorkflow {
    type Item = ClaimedPurchase;

    fn name(&self) -> &'static str {
        "refund"
    }

    async fn claim(&self) -> AppResult<Vec<ClaimedBatch<ClaimedPurchase>>> {
        self.store
            .claim_purchase_requests(self.wallet_lock_staleness)
            .await
    }

    async fn submit(&self, source: &PaymentSource, item: &ClaimedPurchase) -> AppResult<String> {
        let client = self.clients.for_source(source);
        let signer = materialize_signer(
            &self.secrets,
            &client,
            &item.wallet_address,
            &item.encrypted_secret,
        )
        .await?;

        let escrow_utxo = find_escrow_utxo(
            &client,
            item.current_tx_hash.as_deref(),
            &source.contract_address,
        )
        .await?;
        let datum_json = escrow_utxo
            .inline_datum
            .as_ref()
            .ok_or(AppError::Chain(ChainError::MissingDatum))?;

        // The buying wallet is the datum's buyer side
        let mut datum = EscrowDatum::decode(datum_json)?;
        datum.buyer_vkey = item.wallet_vkey.clone();
        datum.seller_vkey = item.seller_vkey.clone();
        datum.blockchain_identifier = hex::encode(item.blockchain_identifier.as_bytes());
        let new_datum = datum.with_refund_requested();

        self.store
            .mark_purchase_initiated(item.id, PurchaseAction::RefundInitiated)
            .await?;

        let intent = TransactionIntent {
            network: source.network,
            signing_mnemonic: signer.mnemonic,
            change_address: signer.address,
            metadata_message: vec!["Escrow".into(), "RequestRefund".into()],
            validity: ValidityWindow::around(source.network, Utc::now()),
            kind: IntentKind::RelockEscrow {
                contract_address: source.contract_address.clone(),
                escrow_utxo,
                redeemer: SpendRedeemer::RequestRefund.to_plutus(),
                new_datum: new_datum.encode(),
            },
        };

        let tx_hash = client.build_and_submit(&intent).await?;
        self.store
            .record_purchase_transaction(item.id, item.wallet_id, &tx_hash)
            .await?;

        info!(
            "refund: purchase {} refund requested, https://{}/transaction/{}",
            item.id,
            source.network.explorer_host(),
            tx_hash
        );
        Ok(tx_hash)
    }

    async fn record_failure(&self, item: &ClaimedPurchase, error: &AppError) -> AppResult<()> {
        self.store
            .fail_purchase_request(
                item.id,
                classify_error(error),
                &error_note("requesting refund failed", error),
            )
            .await
    }
}
