pub mod dto;
pub mod errors;
pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::oracle::OrderStatusOracle;
use crate::store::OrderbookStore;
use crate::streams::EventStream;

pub use handlers::AppState;

/// Builds the HTTP surface (C9): signed-order intake, operator match submission, status/nonce
/// lookups, and the orderbook snapshot. The websocket upgrade itself lives in `realtime::ws`
/// and is merged in by the binary that owns a `Fanout`.
pub fn router<S, E, O>(state: Arc<AppState<S, E, O>>) -> Router
where
    S: OrderbookStore + 'static,
    E: EventStream + 'static,
    O: OrderStatusOracle + 'static,
{
    Router::new()
        .route("/orders", post(handlers::submit_order::<S, E, O>))
        .route("/match", post(handlers::operator_match::<S, E, O>))
        .route("/orders/{hash}", get(handlers::order_status::<S, E, O>))
        .route("/nonce/{wallet}", get(handlers::nonce_lookup::<S, E, O>))
        .route("/orderbook/{market}/{token}", get(handlers::orderbook_snapshot::<S, E, O>))
        .route("/healthz", get(handlers::healthz))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
