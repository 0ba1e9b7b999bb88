//! services/dispatcher/src/bin/dispatcher.rs

use dispatcher_lib::{
    adapters::{DbAdapter, WhapiSender},
    config::Config,
    engine::{run_dispatch_loop, run_quota_reset_loop, DispatchEngine, QuotaManager},
    error::DispatcherError,
};
use promo_core::ports::{AccountStore, MessageSender, PromotionStore};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), DispatcherError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            config.log_level.to_string(),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting dispatcher...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let sender: Arc<dyn MessageSender> = Arc::new(WhapiSender::new(
        config.whapi_api_url.clone(),
        config.whapi_api_token.clone(),
        config.send_timeout,
    ));
    let promotion_store: Arc<dyn PromotionStore> = db_adapter.clone();
    let account_store: Arc<dyn AccountStore> = db_adapter;

    // --- 4. Build the Engine and Its Two Timers ---
    let engine = Arc::new(DispatchEngine::new(
        promotion_store,
        account_store.clone(),
        sender,
    ));
    let quota = QuotaManager::new(account_store);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let dispatch_task = tokio::spawn(run_dispatch_loop(
        engine,
        config.dispatch_interval,
        shutdown_rx.clone(),
    ));
    let reset_task = tokio::spawn(run_quota_reset_loop(quota, shutdown_rx));

    // --- 5. Run Until Interrupted ---
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping schedulers...");
    let _ = shutdown_tx.send(true);

    let _ = dispatch_task.await;
    let _ = reset_task.await;
    info!("Dispatcher stopped.");

    Ok(())
}
