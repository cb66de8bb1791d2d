//! Trade Runner
//!
//! Scheduled copy-trade execution: signal pickup, order execution, exit
//! scans, venue synchronization and capital reconciliation.

mod runner;
mod signals;

use anyhow::Result;
use copytrade_core::api::{ClobClient, VenueApi};
use copytrade_core::config::Config;
use copytrade_core::db::{create_pool, run_migrations, PgStore, Store};
use execution_engine::{
    CapitalReconciler, EventBus, KellySizer, OrderSynchronizer, SellManager, TradeExecutor,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "trade_runner=info,execution_engine=info,copytrade_core=warn,hyper=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Trade Runner");

    let config = Config::from_env()?;

    let pool = create_pool(&config.database).await?;
    run_migrations(&pool).await?;
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));

    let venue: Arc<dyn VenueApi> = Arc::new(ClobClient::new(
        config.venue.clob_url.clone(),
        config.venue.data_url.clone(),
    ));

    let events = EventBus::default();
    let executor = TradeExecutor::new(
        Arc::clone(&store),
        Arc::clone(&venue),
        events.clone(),
        Arc::new(KellySizer),
        config.executor.clone(),
    );
    let sell_manager = SellManager::new(Arc::clone(&store), Arc::clone(&venue), events.clone());
    let synchronizer = OrderSynchronizer::new(
        Arc::clone(&store),
        Arc::clone(&venue),
        events.clone(),
        config.executor.lost_order_threshold,
    );
    let reconciler = CapitalReconciler::new(Arc::clone(&store));
    let source = Arc::new(signals::ActivitySignalSource::new(Arc::clone(&venue)));

    let runner = runner::Runner::new(
        store,
        executor,
        sell_manager,
        synchronizer,
        reconciler,
        source,
        config,
    );
    runner.run().await?;

    Ok(())
}
