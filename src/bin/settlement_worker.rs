use std::sync::Arc;
use std::time::Duration;

use catallaxyz_core::config::Config;
use catallaxyz_core::settlement::{SettlementWorker, SettlementWorkerConfig, SolanaSettlementClient};
use catallaxyz_core::shutdown;
use catallaxyz_core::store::RedisOrderbookStore;
use catallaxyz_core::streams::RedisEventStream;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::read_keypair_file;
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
    let stream = Arc::new(RedisEventStream::new(conn));

    let program_id: Pubkey = match config.solana.settlement_program_id.parse() {
        Ok(p) => p,
        Err(e) => {
            error!("invalid SETTLEMENT_PROGRAM_ID: {e}");
            std::process::exit(1);
        }
    };
    let operator = match read_keypair_file(&config.solana.operator_keypair_path) {
        Ok(k) => k,
        Err(e) => {
            error!("failed to load operator keypair from {}: {e}", config.solana.operator_keypair_path);
            std::process::exit(1);
        }
    };
    let chain = Arc::new(SolanaSettlementClient::new(&config.solana.rpc_url, program_id, operator));

    let worker_config = SettlementWorkerConfig {
        consumer_name: config.settlement.consumer_name.clone(),
        submit_timeout: Duration::from_secs(config.settlement.submit_timeout_secs),
        base_backoff: Duration::from_secs(config.settlement.base_backoff_secs),
        max_attempts: config.settlement.max_attempts,
        idle_reclaim_ms: config.settlement.idle_reclaim_ms,
    };
    let worker = SettlementWorker::new(store, stream, chain, worker_config);

    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    shutdown::install_signal_handler(shutdown_tx);

    info!("settlement worker starting, consumer={}", config.settlement.consumer_name);
    match shutdown::with_shutdown_cap(worker.run(shutdown_rx.clone()), shutdown_rx).await {
        Some(Ok(())) => {
            info!("settlement worker shut down cleanly");
            Ok(())
        }
        Some(Err(e)) => {
            error!("settlement worker error: {e}");
            std::process::exit(1);
        }
        None => std::process::exit(1),
    }
}
