use std::sync::Arc;
use std::time::Duration;

use catallaxyz_core::config::Config;
use catallaxyz_core::persistence::{
    BalanceSnapshotter, Ledger, MarketTitleCache, NullNotificationSink, PersistenceWorker, PersistenceWorkerConfig,
};
use catallaxyz_core::shutdown;
use catallaxyz_core::store::RedisOrderbookStore;
use catallaxyz_core::streams::RedisEventStream;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::load();
    if let Err(e) = config.validate() {
        error!("config validation failed: {e}");
        std::process::exit(1);
    }

    let redis_client = match redis::Client::open(config.cache.redis_url.clone()) {
        Ok(c) => c,
        Err(e) => {
            error!("failed to parse REDIS_URL: {e}");
            std::process::exit(1);
        }
    };
    let conn = match redis_client.get_connection_manager().await {
        Ok(c) => c,
        Err(e) => {
            error!("failed to connect to cache: {e}");
            std::process::exit(1);
        }
    };

    let store = Arc::new(RedisOrderbookStore::new(conn.clone()));
    let stream = Arc::new(RedisEventStream::new(conn.clone()));

    let ledger = match Ledger::connect(&config.ledger.database_url, config.ledger.max_connections).await {
        Ok(l) => l,
        Err(e) => {
            error!("failed to connect to ledger database: {e}");
            std::process::exit(1);
        }
    };

    let snapshotter = Some(BalanceSnapshotter::new(conn));
    let market_titles = MarketTitleCache::new(
        config.persistence.market_title_cache_capacity,
        Duration::from_secs(config.persistence.market_title_cache_ttl_secs),
    );

    // No websocket surface in this process; trade notifications are the engine binary's concern.
    let notifier = Arc::new(NullNotificationSink);

    let worker_config = PersistenceWorkerConfig {
        consumer_name: config.persistence.consumer_name.clone(),
        batch_size: config.persistence.batch_size,
        block_ms: config.persistence.block_ms,
        idle_reclaim_ms: config.persistence.idle_reclaim_ms,
        snapshot_every_n_iterations: config.persistence.snapshot_every_n_iterations,
    };
    let worker = PersistenceWorker::new(store, stream, ledger, notifier, snapshotter, market_titles, worker_config);

    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    shutdown::install_signal_handler(shutdown_tx);

    info!("persistence worker starting, consumer={}", config.persistence.consumer_name);
    match shutdown::with_shutdown_cap(worker.run(shutdown_rx.clone()), shutdown_rx).await {
        Some(Ok(())) => {
            info!("persistence worker shut down cleanly");
            Ok(())
        }
        Some(Err(e)) => {
            error!("persistence worker error: {e}");
            std::process::exit(1);
        }
        None => std::process::exit(1),
    }
}
