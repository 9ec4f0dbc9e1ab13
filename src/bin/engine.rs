use std::net::SocketAddr;
use std::sync::Arc;

use catallaxyz_core::api::{self, AppState};
use catallaxyz_core::config::Config;
use catallaxyz_core::matching::MatchingEngine;
use catallaxyz_core::oracle::SolanaOrderStatusOracle;
use catallaxyz_core::realtime::{ws_handler, Fanout};
use catallaxyz_core::shutdown;
use catallaxyz_core::store::RedisOrderbookStore;
use catallaxyz_core::streams::RedisEventStream;
use solana_sdk::pubkey::Pubkey;
use tracing::{error, info};

/// Channel-auth secret lookup. Real deployments inject the store the auth service shares
/// credentials through; this binary carries a null implementation since issuing those
/// credentials is outside this core (session/auth flows are an explicit non-goal).
struct NullSecretStore;

impl catallaxyz_core::realtime::ws::ChannelSecretStore for NullSecretStore {
    fn secret_for(&self, _wallet: &str) -> Option<Vec<u8>> {
        None
    }
}

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
    let program_id: Pubkey = config
        .solana
        .settlement_program_id
        .parse()
        .unwrap_or_default();
    let oracle = Arc::new(SolanaOrderStatusOracle::new(&config.solana.rpc_url, program_id));
    let engine = Arc::new(MatchingEngine::new(store.clone(), stream.clone()));

    let app_state = Arc::new(AppState { store: store.clone(), stream: stream.clone(), engine, oracle });
    let fanout = Arc::new(Fanout::new(
        config.fanout.max_connections,
        config.fanout.max_connections_per_ip,
        config.fanout.max_subscriptions_per_connection,
    ));
    let ws_state = Arc::new(catallaxyz_core::realtime::ws::WsState {
        fanout,
        secrets: Arc::new(NullSecretStore),
    });

    let ws_router = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(ws_state);
    let router = api::router(app_state).merge(ws_router);

    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    shutdown::install_signal_handler(shutdown_tx);

    let addr: SocketAddr = config.http.bind_addr.parse()?;
    info!("engine listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let mut rx = shutdown_rx.clone();
    let serve = axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            let _ = rx.changed().await;
        });

    match shutdown::with_shutdown_cap(serve, shutdown_rx).await {
        Some(Ok(())) => {
            info!("engine shut down cleanly");
            Ok(())
        }
        Some(Err(e)) => {
            error!("engine server error: {e}");
            std::process::exit(1);
        }
        None => std::process::exit(1),
    }
}
