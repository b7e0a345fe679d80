// Collect workflow: seller withdraws escrowed funds once the unlock
// time has passed with no open refund request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::chain::client::{IntentKind, LedgerClientFactory, TransactionIntent};
use crate::chain::datum::SpendRedeemer;
use crate::chain::ValidityWindow;
use crate::error::{error_note, AppError, AppResult};
use crate::secrets::SecretStore;
use crate::settlement::engine::Workflow;
use crate::settlement::{classify_error, find_escrow_utxo, materialize_signer};
use crate::store::models::{ClaimedBatch, ClaimedPayment, PaymentClaim, PaymentSource};
use crate::store::SettlementStore;

pub struct CollectWorkflow {
    store: Arc<dyn SettlementStore>,
    secrets: Arc<dyn SecretStore>,
    clients: Arc<dyn LedgerClientFactory>,
    wallet_lock_staleness: Duration,
}

impl CollectWorkflow {
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
impl Workflow for CollectWorkflow {
    type Item = ClaimedPayment;

    fn name(&self) -> &'static str {
        "collect"
    }

    async fn claim(&self) -> AppResult<Vec<ClaimedBatch<ClaimedPayment>>> {
        self.store
            .claim_payment_requests(PaymentClaim::Withdraw, self.wallet_lock_staleness)
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

        self.store
            .mark_payment_initiated(item.id, PaymentClaim::Withdraw.initiated_action())
            .await?;

        let intent = TransactionIntent {
            network: source.network,
            signing_mnemonic: signer.mnemonic,
            change_address: signer.address.clone(),
            metadata_message: vec!["Escrow".into(), "Withdraw".into()],
            validity: ValidityWindow::around(source.network, Utc::now()),
            kind: IntentKind::SpendEscrow {
                contract_address: source.contract_address.clone(),
                escrow_utxo,
                redeemer: SpendRedeemer::Withdraw.to_plutus(),
                pay_to: signer.address,
            },
        };

        let tx_hash = client.build_and_submit(&intent).await?;
        self.store
            .record_payment_transaction(item.id, item.wallet_id, &tx_hash)
            .await?;

        info!(
            "collect: payment {} withdrawn, https://{}/transaction/{}",
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
                &error_note("collecting payment failed", error),
            )
            .await
    }
}
