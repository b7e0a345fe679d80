// Deny-refund workflow: seller rejects a pending refund request,
// re-locking the escrow with the refund flag cleared.

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
use crate::store::models::{ClaimedBatch, ClaimedPayment, PaymentClaim, PaymentSource};
use crate::store::SettlementStore;

pub struct DenyRefundWorkflow {
    store: Arc<dyn SettlementStore>,
    secrets: Arc<dyn SecretStore>,
    clients: Arc<dyn LedgerClientFactory>,
    wallet_lock_staleness: Duration,
}

impl DenyRefundWorkflow {
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
impl Workflow for DenyRefundWorkflow {
    type Item = ClaimedPayment;

    fn name(&self) -> &'static str {
        "deny_refund"
    }

    async fn claim(&self) -> AppResult<Vec<ClaimedBatch<ClaimedPayment>>> {
        self.store
            .claim_payment_requests(PaymentClaim::DenyRefund, self.wallet_lock_staleness)
            .await
    }

    async fn submit(&self, source: &PaymentSource, item: &ClaimedPayment) -> AppResult<String> {
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

        let mut datum = EscrowDatum::decode(datum_json)?;
        datum.buyer_vkey = item.buyer_vkey.clone();
        datum.seller_vkey = item.wallet_vkey.clone();
        datum.blockchain_identifier = hex::encode(item.blockchain_identifier.as_bytes());
        let new_datum = datum.with_refund_denied();

        self.store
            .mark_payment_initiated(item.id, PaymentClaim::DenyRefund.initiated_action())
            .await?;

        let intent = TransactionIntent {
            network: source.network,
            signing_mnemonic: signer.mnemonic,
            change_address: signer.address,
            metadata_message: vec!["Escrow".into(), "DenyRefund".into()],
            validity: ValidityWindow::around(source.network, Utc::now()),
            kind: IntentKind::RelockEscrow {
                contract_address: source.contract_address.clone(),
                escrow_utxo,
                redeemer: SpendRedeemer::DenyRefund.to_plutus(),
                new_datum: new_datum.encode(),
            },
        };

        let tx_hash = client.build_and_submit(&intent).await?;
        self.store
            .record_payment_transaction(item.id, item.wallet_id, &tx_hash)
            .await?;

        info!(
            "deny_refund: payment {} denied, https://{}/transaction/{}",
            item.id,
            source.network.explorer_host(),
            tx_hash
        );
        Ok(tx_hash)
    }

    async fn record_failure(&self, item: &ClaimedPayment, error: &AppError) -> AppResult<()> {
        self.store
            .fail_payment_request(
                item.id,
                classify_error(error),
                &error_note("denying refund failed", error),
            )
            .await
    }
}
