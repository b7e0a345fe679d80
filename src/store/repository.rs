// Postgres-backed settlement store.
//
// The claim queries implement the read-and-lock discipline: select
// eligible requests with row locks on request and wallet, stamp the
// wallet locks, and commit, all in one transaction. `SKIP LOCKED`
// keeps two overlapping claims from blocking on each other's rows;
// the `locked_at` staleness check keeps them from racing on wallets
// across passes.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::prelude::FromRow;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::chain::Network;
use crate::error::AppResult;
use crate::store::models::*;
use crate::store::SettlementStore;

pub struct PgSettlementStore {
    pub pool: PgPool,
}

impl PgSettlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_wallets(
        tx: &mut Transaction<'_, Postgres>,
        wallet_ids: &[Uuid],
    ) -> AppResult<()> {
        if wallet_ids.is_empty() {
            return Ok(());
        }

        sqlx::query("UPDATE hot_wallets SET locked_at = now() WHERE id = ANY($1)")
            .bind(wallet_ids)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    async fn record_transaction(
        &self,
        table: &str,
        request_id: Uuid,
        wallet_id: Uuid,
        tx_hash: &str,
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let record_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO transaction_records (tx_hash, status, wallet_id)
            VALUES ($1, 'pending', $2)
            RETURNING id
            "#,
        )
        .bind(tx_hash)
        .bind(wallet_id)
        .fetch_one(&mut *tx)
        .await?;

        let update = format!(
            "UPDATE {} SET current_transaction_id = $1, updated_at = now() WHERE id = $2",
            table
        );
        sqlx::query(&update)
            .bind(record_id)
            .bind(request_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    fn staleness_cutoff(staleness: Duration) -> DateTime<Utc> {
        Utc::now() - chrono::Duration::from_std(staleness).unwrap_or(chrono::Duration::zero())
    }
}

/// Flat claim row: request + wallet + source columns in one result set
#[derive(Debug, FromRow)]
struct PaymentClaimRow {
    pub id: Uuid,
    pub blockchain_identifier: String,
    pub buyer_vkey: String,
    pub result_hash: Option<String>,
    pub current_tx_hash: Option<String>,
    pub wallet_id: Uuid,
    pub wallet_address: String,
    pub wallet_vkey: String,
    pub encrypted_secret: String,
    #[sqlx(flatten)]
    pub source: SourceColumns,
}

#[derive(Debug, FromRow)]
struct PurchaseClaimRow {
    pub id: Uuid,
    pub blockchain_identifier: String,
    pub seller_vkey: String,
    pub current_tx_hash: Option<String>,
    pub wallet_id: Uuid,
    pub wallet_address: String,
    pub wallet_vkey: String,
    pub encrypted_secret: String,
    #[sqlx(flatten)]
    pub source: SourceColumns,
}

#[derive(Debug, FromRow)]
struct RegistryClaimRow {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub wallet_address: String,
    pub wallet_vkey: String,
    pub encrypted_secret: String,
    #[sqlx(flatten)]
    pub source: SourceColumns,
}

#[derive(Debug, Clone, FromRow)]
struct SourceColumns {
    pub source_id: Uuid,
    pub network: Network,
    pub provider_base_url: String,
    pub provider_api_key: String,
    pub builder_url: String,
    pub contract_address: String,
    pub registry_policy_id: String,
}

impl From<SourceColumns> for PaymentSource {
    fn from(c: SourceColumns) -> Self {
        PaymentSource {
            id: c.source_id,
            network: c.network,
            provider_base_url: c.provider_base_url,
            provider_api_key: c.provider_api_key,
            builder_url: c.builder_url,
            contract_address: c.contract_address,
            registry_policy_id: c.registry_policy_id,
        }
    }
}

const SOURCE_COLUMNS: &str = r#"
    s.id AS source_id, s.network, s.provider_base_url, s.provider_api_key,
    s.builder_url, s.contract_address, s.registry_policy_id
"#;

/// Group flat rows by payment source, keeping at most one request per
/// wallet per pass (two items on one wallet would contend for the same
/// UTXOs within a single batch).
fn group_rows<R, T>(
    rows: Vec<R>,
    source_of: impl Fn(&R) -> PaymentSource,
    wallet_of: impl Fn(&R) -> Uuid,
    into_item: impl Fn(R) -> T,
) -> (Vec<ClaimedBatch<T>>, Vec<Uuid>) {
    let mut batches: Vec<ClaimedBatch<T>> = Vec::new();
    let mut index: HashMap<Uuid, usize> = HashMap::new();
    let mut seen_wallets: Vec<Uuid> = Vec::new();

    for row in rows {
        let wallet_id = wallet_of(&row);
        if seen_wallets.contains(&wallet_id) {
            continue;
        }
        seen_wallets.push(wallet_id);

        let source = source_of(&row);
        let at = *index.entry(source.id).or_insert_with(|| {
            batches.push(ClaimedBatch {
                source,
                requests: Vec::new(),
            });
            batches.len() - 1
        });
        batches[at].requests.push(into_item(row));
    }

    (batches, seen_wallets)
}

#[async_trait]
impl SettlementStore for PgSettlementStore {
    async fn claim_payment_requests(
        &self,
        claim: PaymentClaim,
        staleness: Duration,
    ) -> AppResult<Vec<ClaimedBatch<ClaimedPayment>>> {
        let cutoff = Self::staleness_cutoff(staleness);
        let now_ms = Utc::now().timestamp_millis();

        let base = format!(
            r#"
            SELECT r.id, r.blockchain_identifier, r.buyer_vkey, r.result_hash,
                   t.tx_hash AS current_tx_hash,
                   w.id AS wallet_id, w.address AS wallet_address,
                   w.vkey_hash AS wallet_vkey, w.encrypted_secret,
                   {SOURCE_COLUMNS}
            FROM payment_requests r
            JOIN hot_wallets w ON w.id = r.wallet_id
            JOIN payment_sources s ON s.id = r.payment_source_id
            LEFT JOIN transaction_records t ON t.id = r.current_transaction_id
            WHERE r.requested_action = $1
              AND (w.locked_at IS NULL OR w.locked_at < $2)
              {extra}
            ORDER BY r.created_at
            FOR UPDATE OF r, w SKIP LOCKED
            "#,
            SOURCE_COLUMNS = SOURCE_COLUMNS,
            extra = match claim {
                PaymentClaim::SubmitResult =>
                    "AND r.result_hash IS NOT NULL AND r.submit_result_time >= $3",
                PaymentClaim::Withdraw => "AND r.unlock_time <= $3",
                PaymentClaim::DenyRefund => "",
            },
        );

        let mut tx = self.pool.begin().await?;

        let query = sqlx::query_as::<_, PaymentClaimRow>(&base)
            .bind(claim.requested_action())
            .bind(cutoff);
        let rows = match claim {
            // One minute of block-time headroom before the window closes
            PaymentClaim::SubmitResult => query.bind(now_ms + 60_000),
            PaymentClaim::Withdraw => query.bind(now_ms),
            PaymentClaim::DenyRefund => query,
        }
        .fetch_all(&mut *tx)
        .await?;

        let (batches, wallet_ids) = group_rows(
            rows,
            |r| r.source.clone().into(),
            |r| r.wallet_id,
            |r| ClaimedPayment {
                id: r.id,
                blockchain_identifier: r.blockchain_identifier,
                buyer_vkey: r.buyer_vkey,
                result_hash: r.result_hash,
                current_tx_hash: r.current_tx_hash,
                wallet_id: r.wallet_id,
                wallet_address: r.wallet_address,
                wallet_vkey: r.wallet_vkey,
                encrypted_secret: r.encrypted_secret,
            },
        );

        Self::lock_wallets(&mut tx, &wallet_ids).await?;
        tx.commit().await?;

        debug!(
            "Claimed {} payment requests ({:?}) across {} sources",
            wallet_ids.len(),
            claim,
            batches.len()
        );
        Ok(batches)
    }

    async fn claim_purchase_requests(
        &self,
        staleness: Duration,
    ) -> AppResult<Vec<ClaimedBatch<ClaimedPurchase>>> {
        let cutoff = Self::staleness_cutoff(staleness);

        let sql = format!(
            r#"
            SELECT r.id, r.blockchain_identifier, r.seller_vkey,
                   t.tx_hash AS current_tx_hash,
                   w.id AS wallet_id, w.address AS wallet_address,
                   w.vkey_hash AS wallet_vkey, w.encrypted_secret,
                   {}
            FROM purchase_requests r
            JOIN hot_wallets w ON w.id = r.wallet_id
            JOIN payment_sources s ON s.id = r.payment_source_id
            LEFT JOIN transaction_records t ON t.id = r.current_transaction_id
            WHERE r.requested_action = 'refund_requested'
              AND (w.locked_at IS NULL OR w.locked_at < $1)
            ORDER BY r.created_at
            FOR UPDATE OF r, w SKIP LOCKED
            "#,
            SOURCE_COLUMNS
        );

        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query_as::<_, PurchaseClaimRow>(&sql)
            .bind(cutoff)
            .fetch_all(&mut *tx)
            .await?;

        let (batches, wallet_ids) = group_rows(
            rows,
            |r| r.source.clone().into(),
            |r| r.wallet_id,
            |r| ClaimedPurchase {
                id: r.id,
                blockchain_identifier: r.blockchain_identifier,
                seller_vkey: r.seller_vkey,
                current_tx_hash: r.current_tx_hash,
                wallet_id: r.wallet_id,
                wallet_address: r.wallet_address,
                wallet_vkey: r.wallet_vkey,
                encrypted_secret: r.encrypted_secret,
            },
        );

        Self::lock_wallets(&mut tx, &wallet_ids).await?;
        tx.commit().await?;

        Ok(batches)
    }

    async fn claim_registry_requests(
        &self,
        staleness: Duration,
    ) -> AppResult<Vec<ClaimedBatch<ClaimedRegistry>>> {
        let cutoff = Self::staleness_cutoff(staleness);

        let sql = format!(
            r#"
            SELECT r.id,
                   w.id AS wallet_id, w.address AS wallet_address,
                   w.vkey_hash AS wallet_vkey, w.encrypted_secret,
                   {}
            FROM registry_requests r
            JOIN hot_wallets w ON w.id = r.wallet_id
            JOIN payment_sources s ON s.id = r.payment_source_id
            WHERE r.state = 'deregistration_requested'
              AND (w.locked_at IS NULL OR w.locked_at < $1)
            ORDER BY r.created_at
            FOR UPDATE OF r, w SKIP LOCKED
            "#,
            SOURCE_COLUMNS
        );

        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query_as::<_, RegistryClaimRow>(&sql)
            .bind(cutoff)
            .fetch_all(&mut *tx)
            .await?;

        let (batches, wallet_ids) = group_rows(
            rows,
            |r| r.source.clone().into(),
            |r| r.wallet_id,
            |r| ClaimedRegistry {
                id: r.id,
                wallet_id: r.wallet_id,
                wallet_address: r.wallet_address,
                wallet_vkey: r.wallet_vkey,
                encrypted_secret: r.encrypted_secret,
            },
        );

        Self::lock_wallets(&mut tx, &wallet_ids).await?;
        tx.commit().await?;

        Ok(batches)
    }

    async fn mark_payment_initiated(
        &self,
        request_id: Uuid,
        action: PaymentAction,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE payment_requests SET requested_action = $1, updated_at = now() WHERE id = $2",
        )
        .bind(action)
        .bind(request_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_payment_transaction(
        &self,
        request_id: Uuid,
        wallet_id: Uuid,
        tx_hash: &str,
    ) -> AppResult<()> {
        self.record_transaction("payment_requests", request_id, wallet_id, tx_hash)
            .await
    }

    async fn fail_payment_request(
        &self,
        request_id: Uuid,
        error_type: RequestErrorType,
        note: &str,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            WITH failed AS (
                UPDATE payment_requests
                SET requested_action = 'waiting_for_manual_action',
                    error_type = $1,
                    error_note = $2,
                    updated_at = now()
                WHERE id = $3
                RETURNING wallet_id
            )
            UPDATE hot_wallets SET locked_at = NULL
            WHERE id IN (SELECT wallet_id FROM failed)
            "#,
        )
        .bind(error_type)
        .bind(note)
        .bind(request_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_purchase_initiated(
        &self,
        request_id: Uuid,
        action: PurchaseAction,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE purchase_requests SET requested_action = $1, updated_at = now() WHERE id = $2",
        )
        .bind(action)
        .bind(request_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_purchase_transaction(
        &self,
        request_id: Uuid,
        wallet_id: Uuid,
        tx_hash: &str,
    ) -> AppResult<()> {
        self.record_transaction("purchase_requests", request_id, wallet_id, tx_hash)
            .await
    }

    async fn fail_purchase_request(
        &self,
        request_id: Uuid,
        error_type: RequestErrorType,
        note: &str,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            WITH failed AS (
                UPDATE purchase_requests
                SET requested_action = 'waiting_for_manual_action',
                    error_type = $1,
                    error_note = $2,
                    updated_at = now()
                WHERE id = $3
                RETURNING wallet_id
            )
            UPDATE hot_wallets SET locked_at = NULL
            WHERE id IN (SELECT wallet_id FROM failed)
            "#,
        )
        .bind(error_type)
        .bind(note)
        .bind(request_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_registry_state(
        &self,
        request_id: Uuid,
        state: RegistrationState,
    ) -> AppResult<()> {
        sqlx::query("UPDATE registry_requests SET state = $1, updated_at = now() WHERE id = $2")
            .bind(state)
            .bind(request_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_registry_transaction(
        &self,
        request_id: Uuid,
        wallet_id: Uuid,
        tx_hash: &str,
    ) -> AppResult<()> {
        self.record_transaction("registry_requests", request_id, wallet_id, tx_hash)
            .await
    }

    async fn fail_registry_request(&self, request_id: Uuid, note: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            WITH failed AS (
                UPDATE registry_requests
                SET state = 'deregistration_failed',
                    error_note = $1,
                    updated_at = now()
                WHERE id = $2
                RETURNING wallet_id
            )
            UPDATE hot_wallets SET locked_at = NULL
            WHERE id IN (SELECT wallet_id FROM failed)
            "#,
        )
        .bind(note)
        .bind(request_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn release_wallet_lock(&self, wallet_id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE hot_wallets SET locked_at = NULL WHERE id = $1")
            .bind(wallet_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
