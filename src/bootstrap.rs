use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use crate::api::{AppState, ChainContext};
use crate::chain::provider::EthRpcProvider;
use crate::chain::reconciler::TxReconciler;
use crate::config::Config;
use crate::error::AppResult;
use crate::payroll::commit::CommitmentBuilder;
use crate::payroll::scheduler::RunScheduler;
use crate::store::PgStore;

pub struct App {
    pub state: AppState,
    pub workers: Vec<JoinHandle<()>>,
}

pub async fn initialize_app(config: &Config) -> AppResult<App> {
    info!("Initializing application components ...");

    let pool = initialize_database(&config.database_url).await?;
    let store = Arc::new(PgStore::new(pool));

    let commitment = Arc::new(CommitmentBuilder::new(store.clone()));
    let provider = Arc::new(EthRpcProvider::new(config.rpc_url.clone()));

    let scheduler = RunScheduler::new(
        store.clone(),
        config.token,
        config.vault,
        config.scheduler_interval,
    );
    let reconciler = TxReconciler::new(
        store.clone(),
        store.clone(),
        provider.clone(),
        config.reconciler_interval,
    );
    let workers = vec![scheduler.start(), reconciler.start()];
    info!("✅ Background workers started");

    Ok(App {
        state: AppState {
            payroll: store.clone(),
            chain_txs: store,
            commitment,
            provider,
            chain: ChainContext {
                chain_id: config.chain_id,
                token: config.token,
                vault: config.vault,
            },
        },
        workers,
    })
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("Connecting to database ...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("✅ Database connected and migrated");
    Ok(pool)
}
