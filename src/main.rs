//! Wallet Ledger daemon
//!
//! Wires the PostgreSQL ledger store, the HTTP settlement gateway and the
//! lifecycle controller together, then runs the reconciliation worker.
//!
//! ```text
//! ┌──────────┐    ┌────────────┐    ┌──────────────┐    ┌──────────┐
//! │  Config  │───▶│ PgLedger   │───▶│ Transaction  │───▶│ Gateway  │
//! │  (YAML)  │    │  Store     │    │ Controller   │    │  (HTTP)  │
//! └──────────┘    └────────────┘    └──────┬───────┘    └──────────┘
//!                                          │
//!                                   ReconciliationWorker
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use wallet_ledger::cache::BalanceCache;
use wallet_ledger::config::AppConfig;
use wallet_ledger::db::{Database, schema};
use wallet_ledger::ledger::{
    ControllerConfig, HttpSettlementGateway, PgLedgerStore, ReconciliationWorker,
    TracingAlertSink, TransactionController, WorkerConfig,
};
use wallet_ledger::logging::init_logging;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env)?;
    let _log_guard = init_logging(&app_config);

    info!(env = %env, "Starting wallet ledger");

    let postgres_url = app_config
        .postgres_url
        .as_deref()
        .context("postgres_url is required")?;
    let db = Database::connect(postgres_url, app_config.max_connections)
        .await
        .context("Failed to connect to PostgreSQL")?;
    db.health_check().await.context("PostgreSQL health check failed")?;
    schema::ensure_schema(db.pool())
        .await
        .context("Failed to apply ledger schema")?;

    let store = Arc::new(PgLedgerStore::new(db.pool().clone()));
    let gateway = Arc::new(HttpSettlementGateway::new(&app_config.gateway)?);
    let alerts = Arc::new(TracingAlertSink);
    let cache = Arc::new(BalanceCache::new(app_config.balance_cache_ttl_secs));

    let controller = Arc::new(TransactionController::new(
        store,
        gateway,
        alerts.clone(),
        cache,
        ControllerConfig {
            gateway_timeout: Duration::from_millis(app_config.gateway.timeout_ms),
        },
    ));

    let worker = Arc::new(ReconciliationWorker::new(
        controller,
        alerts,
        WorkerConfig::from(&app_config.worker),
    ));

    // Spawn background worker
    let worker_clone = worker.clone();
    tokio::spawn(async move {
        worker_clone.run().await;
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    Ok(())
}
