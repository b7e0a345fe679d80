use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tracing::info;

use crate::chain::client::{LedgerClientFactory, ProviderClientFactory};
use crate::config::Config;
use crate::error::AppResult;
use crate::secrets::{SecretStore, TaggedSecretStore};
use crate::settlement::collect::CollectWorkflow;
use crate::settlement::deny::DenyRefundWorkflow;
use crate::settlement::deregister::DeregisterWorkflow;
use crate::settlement::engine::WorkflowRunner;
use crate::settlement::refund::RefundWorkflow;
use crate::settlement::scheduler::{self, ScheduleEntry};
use crate::settlement::submit_result::SubmitResultWorkflow;
use crate::store::{PgSettlementStore, SettlementStore};

/// Wire the engine together and start the workflow schedules. Returns
/// the scheduler handles so the caller owns their lifetime.
pub async fn start_engine(config: &Config) -> AppResult<Vec<JoinHandle<()>>> {
    info!("Initializing settlement engine components ...");

    let pool = initialize_database(&config.database_url).await?;

    let store: Arc<dyn SettlementStore> = Arc::new(PgSettlementStore::new(pool));
    let secrets: Arc<dyn SecretStore> =
        Arc::new(TaggedSecretStore::new(config.encryption_key.clone()));
    let clients: Arc<dyn LedgerClientFactory> = Arc::new(ProviderClientFactory);
    info!("✅ Store, secret store, and ledger client factory initialized");

    let staleness = config.wallet_lock_staleness;

    let submit_result = WorkflowRunner::new(
        SubmitResultWorkflow::new(
            store.clone(),
            secrets.clone(),
            clients.clone(),
            staleness,
        ),
        config.retry.clone(),
    );
    let collect = WorkflowRunner::new(
        CollectWorkflow::new(
            store.clone(),
            secrets.clone(),
            clients.clone(),
            staleness,
        ),
        config.retry.clone(),
    );
    let deny = WorkflowRunner::new(
        DenyRefundWorkflow::new(
            store.clone(),
            secrets.clone(),
            clients.clone(),
            staleness,
        ),
        config.retry.clone(),
    );
    let refund = WorkflowRunner::new(
        RefundWorkflow::new(
            store.clone(),
            secrets.clone(),
            clients.clone(),
            staleness,
        ),
        config.retry.clone(),
    );
    let deregister = WorkflowRunner::new(
        DeregisterWorkflow::new(store, secrets, clients, staleness),
        config.retry.clone(),
    );

    let handles = scheduler::start(vec![
        ScheduleEntry {
            trigger: Arc::new(submit_result),
            every: config.submit_result_interval,
        },
        ScheduleEntry {
            trigger: Arc::new(collect),
            every: config.collect_interval,
        },
        ScheduleEntry {
            trigger: Arc::new(deny),
            every: config.deny_interval,
        },
        ScheduleEntry {
            trigger: Arc::new(refund),
            every: config.refund_interval,
        },
        ScheduleEntry {
            trigger: Arc::new(deregister),
            every: config.deregister_interval,
        },
    ]);

    info!("✅ {} workflow schedules started", handles.len());
    Ok(handles)
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
