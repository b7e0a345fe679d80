// In-memory settlement store for handler tests: same contract as the
// Postgres store, backed by maps behind an async RwLock.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::store::models::*;
use crate::store::SettlementStore;

#[derive(Debug, Clone)]
pub struct PaymentRow {
    pub id: Uuid,
    pub source_id: Uuid,
    pub wallet_id: Uuid,
    pub blockchain_identifier: String,
    pub buyer_vkey: String,
    pub submit_result_time: i64,
    pub unlock_time: i64,
    pub requested_action: PaymentAction,
    pub result_hash: Option<String>,
    pub error_type: Option<RequestErrorType>,
    pub error_note: Option<String>,
    pub current_tx_hash: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PurchaseRow {
    pub id: Uuid,
    pub source_id: Uuid,
    pub wallet_id: Uuid,
    pub blockchain_identifier: String,
    pub seller_vkey: String,
    pub requested_action: PurchaseAction,
    pub error_type: Option<RequestErrorType>,
    pub error_note: Option<String>,
    pub current_tx_hash: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RegistryRow {
    pub id: Uuid,
    pub source_id: Uuid,
    pub wallet_id: Uuid,
    pub state: RegistrationState,
    pub error_note: Option<String>,
    pub current_tx_hash: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RecordedTx {
    pub request_id: Uuid,
    pub wallet_id: Uuid,
    pub tx_hash: String,
}

#[derive(Default)]
struct Inner {
    sources: Vec<PaymentSource>,
    wallets: HashMap<Uuid, Option<DateTime<Utc>>>,
    wallet_info: HashMap<Uuid, (String, String, String)>, // address, vkey, secret
    payments: Vec<PaymentRow>,
    purchases: Vec<PurchaseRow>,
    registries: Vec<RegistryRow>,
    transactions: Vec<RecordedTx>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: tokio::sync::RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_source(&self, source: PaymentSource) {
        self.inner.write().await.sources.push(source);
    }

    pub async fn add_wallet(&self, id: Uuid, address: &str, vkey: &str, secret: &str) {
        let mut inner = self.inner.write().await;
        inner.wallets.insert(id, None);
        inner
            .wallet_info
            .insert(id, (address.into(), vkey.into(), secret.into()));
    }

    pub async fn lock_wallet_at(&self, id: Uuid, at: DateTime<Utc>) {
        self.inner.write().await.wallets.insert(id, Some(at));
    }

    pub async fn add_payment(&self, row: PaymentRow) {
        self.inner.write().await.payments.push(row);
    }

    pub async fn add_purchase(&self, row: PurchaseRow) {
        self.inner.write().await.purchases.push(row);
    }

    pub async fn add_registry(&self, row: RegistryRow) {
        self.inner.write().await.registries.push(row);
    }

    pub async fn payment(&self, id: Uuid) -> PaymentRow {
        self.inner
            .read()
            .await
            .payments
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .expect("payment row")
    }

    pub async fn purchase(&self, id: Uuid) -> PurchaseRow {
        self.inner
            .read()
            .await
            .purchases
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .expect("purchase row")
    }

    pub async fn registry(&self, id: Uuid) -> RegistryRow {
        self.inner
            .read()
            .await
            .registries
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .expect("registry row")
    }

    pub async fn wallet_locked(&self, id: Uuid) -> bool {
        self.inner
            .read()
            .await
            .wallets
            .get(&id)
            .copied()
            .flatten()
            .is_some()
    }

    pub async fn recorded_transactions(&self) -> Vec<RecordedTx> {
        self.inner.read().await.transactions.clone()
    }

    fn wallet_claimable(
        wallets: &HashMap<Uuid, Option<DateTime<Utc>>>,
        wallet_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> bool {
        match wallets.get(&wallet_id) {
            Some(None) => true,
            Some(Some(locked_at)) => *locked_at < cutoff,
            None => false,
        }
    }

    fn source_of(sources: &[PaymentSource], id: Uuid) -> PaymentSource {
        sources
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .expect("payment source")
    }
}

#[async_trait]
impl SettlementStore for MemoryStore {
    async fn claim_payment_requests(
        &self,
        claim: PaymentClaim,
        staleness: Duration,
    ) -> AppResult<Vec<ClaimedBatch<ClaimedPayment>>> {
        let cutoff = Utc::now() - chrono::Duration::from_std(staleness).unwrap();
        let now_ms = Utc::now().timestamp_millis();
        let mut inner = self.inner.write().await;

        let mut claimed_wallets = Vec::new();
        let mut rows = Vec::new();
        for p in &inner.payments {
            if p.requested_action != claim.requested_action() {
                continue;
            }
            let eligible = match claim {
                PaymentClaim::SubmitResult => {
                    p.result_hash.is_some() && p.submit_result_time >= now_ms + 60_000
                }
                PaymentClaim::Withdraw => p.unlock_time <= now_ms,
                PaymentClaim::DenyRefund => true,
            };
            if !eligible
                || claimed_wallets.contains(&p.wallet_id)
                || !Self::wallet_claimable(&inner.wallets, p.wallet_id, cutoff)
            {
                continue;
            }
            claimed_wallets.push(p.wallet_id);
            rows.push(p.clone());
        }

        let now = Utc::now();
        for wallet_id in &claimed_wallets {
            inner.wallets.insert(*wallet_id, Some(now));
        }

        let mut batches: Vec<ClaimedBatch<ClaimedPayment>> = Vec::new();
        for row in rows {
            let (address, vkey, secret) = inner.wallet_info[&row.wallet_id].clone();
            let item = ClaimedPayment {
                id: row.id,
                blockchain_identifier: row.blockchain_identifier,
                buyer_vkey: row.buyer_vkey,
                result_hash: row.result_hash,
                current_tx_hash: row.current_tx_hash,
                wallet_id: row.wallet_id,
                wallet_address: address,
                wallet_vkey: vkey,
                encrypted_secret: secret,
            };
            match batches.iter_mut().find(|b| b.source.id == row.source_id) {
                Some(batch) => batch.requests.push(item),
                None => batches.push(ClaimedBatch {
                    source: Self::source_of(&inner.sources, row.source_id),
                    requests: vec![item],
                }),
            }
        }
        Ok(batches)
    }

    async fn claim_purchase_requests(
        &self,
        staleness: Duration,
    ) -> AppResult<Vec<ClaimedBatch<ClaimedPurchase>>> {
        let cutoff = Utc::now() - chrono::Duration::from_std(staleness).unwrap();
        let mut inner = self.inner.write().await;

        let mut claimed_wallets = Vec::new();
        let mut rows = Vec::new();
        for p in &inner.purchases {
            if p.requested_action != PurchaseAction::RefundRequested
                || claimed_wallets.contains(&p.wallet_id)
                || !Self::wallet_claimable(&inner.wallets, p.wallet_id, cutoff)
            {
                continue;
            }
            claimed_wallets.push(p.wallet_id);
            rows.push(p.clone());
        }

        let now = Utc::now();
        for wallet_id in &claimed_wallets {
            inner.wallets.insert(*wallet_id, Some(now));
        }

        let mut batches: Vec<ClaimedBatch<ClaimedPurchase>> = Vec::new();
        for row in rows {
            let (address, vkey, secret) = inner.wallet_info[&row.wallet_id].clone();
            let item = ClaimedPurchase {
                id: row.id,
                blockchain_identifier: row.blockchain_identifier,
                seller_vkey: row.seller_vkey,
                current_tx_hash: row.current_tx_hash,
                wallet_id: row.wallet_id,
                wallet_address: address,
                wallet_vkey: vkey,
                encrypted_secret: secret,
            };
            match batches.iter_mut().find(|b| b.source.id == row.source_id) {
                Some(batch) => batch.requests.push(item),
                None => batches.push(ClaimedBatch {
                    source: Self::source_of(&inner.sources, row.source_id),
                    requests: vec![item],
                }),
            }
        }
        Ok(batches)
    }

    async fn claim_registry_requests(
        &self,
        staleness: Duration,
    ) -> AppResult<Vec<ClaimedBatch<ClaimedRegistry>>> {
        let cutoff = Utc::now() - chrono::Duration::from_std(staleness).unwrap();
        let mut inner = self.inner.write().await;

        let mut claimed_wallets = Vec::new();
        let mut rows = Vec::new();
        for r in &inner.registries {
            if r.state != RegistrationState::DeregistrationRequested
                || claimed_wallets.contains(&r.wallet_id)
                || !Self::wallet_claimable(&inner.wallets, r.wallet_id, cutoff)
            {
                continue;
            }
            claimed_wallets.push(r.wallet_id);
            rows.push(r.clone());
        }

        let now = Utc::now();
        for wallet_id in &claimed_wallets {
            inner.wallets.insert(*wallet_id, Some(now));
        }

        let mut batches: Vec<ClaimedBatch<ClaimedRegistry>> = Vec::new();
        for row in rows {
            let (address, vkey, secret) = inner.wallet_info[&row.wallet_id].clone();
            let item = ClaimedRegistry {
                id: row.id,
                wallet_id: row.wallet_id,
                wallet_address: address,
                wallet_vkey: vkey,
                encrypted_secret: secret,
            };
            match batches.iter_mut().find(|b| b.source.id == row.source_id) {
                Some(batch) => batch.requests.push(item),
                None => batches.push(ClaimedBatch {
                    source: Self::source_of(&inner.sources, row.source_id),
                    requests: vec![item],
                }),
            }
        }
        Ok(batches)
    }

    async fn mark_payment_initiated(
        &self,
        request_id: Uuid,
        action: PaymentAction,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(p) = inner.payments.iter_mut().find(|p| p.id == request_id) {
            p.requested_action = action;
        }
        Ok(())
    }

    async fn record_payment_transaction(
        &self,
        request_id: Uuid,
        wallet_id: Uuid,
        tx_hash: &str,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(p) = inner.payments.iter_mut().find(|p| p.id == request_id) {
            p.current_tx_hash = Some(tx_hash.to_string());
        }
        inner.transactions.push(RecordedTx {
            request_id,
            wallet_id,
            tx_hash: tx_hash.to_string(),
        });
        Ok(())
    }

    async fn fail_payment_request(
        &self,
        request_id: Uuid,
        error_type: RequestErrorType,
        note: &str,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let wallet_id = if let Some(p) = inner.payments.iter_mut().find(|p| p.id == request_id) {
            p.requested_action = PaymentAction::WaitingForManualAction;
            p.error_type = Some(error_type);
            p.error_note = Some(note.to_string());
            Some(p.wallet_id)
        } else {
            None
        };
        if let Some(wallet_id) = wallet_id {
            inner.wallets.insert(wallet_id, None);
        }
        Ok(())
    }

    async fn mark_purchase_initiated(
        &self,
        request_id: Uuid,
        action: PurchaseAction,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(p) = inner.purchases.iter_mut().find(|p| p.id == request_id) {
            p.requested_action = action;
        }
        Ok(())
    }

    async fn record_purchase_transaction(
        &self,
        request_id: Uuid,
        wallet_id: Uuid,
        tx_hash: &str,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(p) = inner.purchases.iter_mut().find(|p| p.id == request_id) {
            p.current_tx_hash = Some(tx_hash.to_string());
        }
        inner.transactions.push(RecordedTx {
            request_id,
            wallet_id,
            tx_hash: tx_hash.to_string(),
        });
        Ok(())
    }

    async fn fail_purchase_request(
        &self,
        request_id: Uuid,
        error_type: RequestErrorType,
        note: &str,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let wallet_id = if let Some(p) = inner.purchases.iter_mut().find(|p| p.id == request_id) {
            p.requested_action = PurchaseAction::WaitingForManualAction;
            p.error_type = Some(error_type);
            p.error_note = Some(note.to_string());
            Some(p.wallet_id)
        } else {
            None
        };
        if let Some(wallet_id) = wallet_id {
            inner.wallets.insert(wallet_id, None);
        }
        Ok(())
    }

    async fn mark_registry_state(
        &self,
        request_id: Uuid,
        state: RegistrationState,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(r) = inner.registries.iter_mut().find(|r| r.id == request_id) {
            r.state = state;
        }
        Ok(())
    }

    async fn record_registry_transaction(
        &self,
        request_id: Uuid,
        wallet_id: Uuid,
        tx_hash: &str,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(r) = inner.registries.iter_mut().find(|r| r.id == request_id) {
            r.current_tx_hash = Some(tx_hash.to_string());
        }
        inner.transactions.push(RecordedTx {
            request_id,
            wallet_id,
            tx_hash: tx_hash.to_string(),
        });
        Ok(())
    }

    async fn fail_registry_request(&self, request_id: Uuid, note: &str) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let wallet_id = if let Some(r) = inner.registries.iter_mut().find(|r| r.id == request_id) {
            r.state = RegistrationState::DeregistrationFailed;
            r.error_note = Some(note.to_string());
            Some(r.wallet_id)
        } else {
            None
        };
        if let Some(wallet_id) = wallet_id {
            inner.wallets.insert(wallet_id, None);
        }
        Ok(())
    }

    async fn release_wallet_lock(&self, wallet_id: Uuid) -> AppResult<()> {
        self.inner.write().await.wallets.insert(wallet_id, None);
        Ok(())
    }
}
