use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use solana_sdk::pubkey::Pubkey;

use crate::matching::MatchingEngine;
use crate::model::order::{encode_base58, Order, SignedOrder};
use crate::model::{FillEvent, MatchJob, OrderStatus, Side, TokenId};
use crate::oracle::OrderStatusOracle;
use crate::store::{BookLevel, OrderbookStore};
use crate::streams::{EventStream, STREAM_FILLS, STREAM_MATCH_JOBS};

use super::dto::{
    decode_hash_param, NonceResponse, OperatorMatchRequest, StatusResponse, SubmitOrderRequest, SubmitOrderResponse,
};
use super::errors::{ApiError, ErrorCode};

pub struct AppState<S, E, O> {
    pub store: Arc<S>,
    pub stream: Arc<E>,
    pub engine: Arc<MatchingEngine<S, E>>,
    pub oracle: Arc<O>,
}

/// `POST /orders` — signed-order intake (§6).
pub async fn submit_order<S, E, O>(
    State(state): State<Arc<AppState<S, E, O>>>,
    Json(req): Json<SubmitOrderRequest>,
) -> Result<Json<SubmitOrderResponse>, ApiError>
where
    S: OrderbookStore,
    E: crate::streams::EventStream,
    O: OrderStatusOracle,
{
    let order = Order::try_from(&req.order).map_err(|_| ApiError(ErrorCode::InvalidOrder))?;
    let signature = req.signature.decode().map_err(|_| ApiError(ErrorCode::InvalidSignature))?;

    order.validate().map_err(|_| ApiError(ErrorCode::ValidationError))?;
    if order.is_expired(Utc::now().timestamp()) {
        return Err(ApiError(ErrorCode::OrderExpired));
    }

    let signed = SignedOrder { order, signature };
    if !signed.verify() {
        return Err(ApiError(ErrorCode::InvalidSignature));
    }

    let known_nonce = state
        .oracle
        .nonce_of(signed.order.maker)
        .await
        .map_err(|_| ApiError(ErrorCode::ServiceUnavailable))?;
    if signed.order.nonce < known_nonce {
        return Err(ApiError(ErrorCode::InvalidNonce));
    }

    let order_hash = signed.order_hash();
    state
        .store
        .insert(signed)
        .await
        .map_err(|_| ApiError(ErrorCode::ServiceUnavailable))?;

    let outcome = state
        .engine
        .try_match(req_to_signed(&req)?)
        .await
        .map_err(|_| ApiError(ErrorCode::ServiceUnavailable))?;

    let status = if outcome.filled_amount > 0 { "matched" } else { "accepted" };

    Ok(Json(SubmitOrderResponse {
        order_hash: encode_base58(&order_hash),
        status,
        order: req.order,
    }))
}

fn req_to_signed(req: &SubmitOrderRequest) -> Result<SignedOrder, ApiError> {
    let order = Order::try_from(&req.order).map_err(|_| ApiError(ErrorCode::InvalidOrder))?;
    let signature = req.signature.decode().map_err(|_| ApiError(ErrorCode::InvalidSignature))?;
    Ok(SignedOrder { order, signature })
}

fn validate_signed(signed: &SignedOrder, now: i64) -> Result<(), ApiError> {
    signed.order.validate().map_err(|_| ApiError(ErrorCode::ValidationError))?;
    if signed.order.is_expired(now) {
        return Err(ApiError(ErrorCode::OrderExpired));
    }
    if !signed.verify() {
        return Err(ApiError(ErrorCode::InvalidSignature));
    }
    Ok(())
}

/// `POST /match` — operator-submitted match: an operator (or the settlement worker's own
/// reconciliation path) hands over a taker order, its maker counterparties, and the exact fill
/// split, bypassing the book walk in `MatchingEngine::try_match`. Used where the match was
/// already discovered out of band and only needs to be recorded and queued for settlement.
pub async fn operator_match<S, E, O>(
    State(state): State<Arc<AppState<S, E, O>>>,
    Json(req): Json<OperatorMatchRequest>,
) -> Result<Json<SubmitOrderResponse>, ApiError>
where
    S: OrderbookStore,
    E: EventStream,
    O: OrderStatusOracle,
{
    let now = Utc::now().timestamp();

    let taker_signed = req_to_signed(&req.taker_order)?;
    validate_signed(&taker_signed, now)?;
    let taker_hash = taker_signed.order_hash();
    let taker_side = taker_signed.order.side;

    let mut maker_signed = Vec::with_capacity(req.maker_orders.len());
    for maker_req in &req.maker_orders {
        let signed = req_to_signed(maker_req)?;
        validate_signed(&signed, now)?;
        maker_signed.push(signed);
    }

    let maker_fill_amounts: Vec<u64> = match &req.maker_fill_amounts {
        Some(amounts) => amounts
            .iter()
            .map(|a| a.parse().map_err(|_| ApiError(ErrorCode::ValidationError)))
            .collect::<Result<_, _>>()?,
        None => return Err(ApiError(ErrorCode::ValidationError)),
    };
    if maker_fill_amounts.len() != maker_signed.len() {
        return Err(ApiError(ErrorCode::ValidationError));
    }
    let taker_fill_amount: u64 = match &req.taker_fill_amount {
        Some(a) => a.parse().map_err(|_| ApiError(ErrorCode::ValidationError))?,
        None => maker_fill_amounts.iter().sum(),
    };

    let taker_owner = taker_signed.order.maker;
    state.store.insert(taker_signed).await.map_err(|_| ApiError(ErrorCode::ServiceUnavailable))?;
    let mut maker_hashes = Vec::with_capacity(maker_signed.len());
    for signed in &maker_signed {
        state
            .store
            .insert(*signed)
            .await
            .map_err(|_| ApiError(ErrorCode::ServiceUnavailable))?;
        maker_hashes.push(signed.order_hash());
    }

    for (hash, amount) in maker_hashes.iter().zip(&maker_fill_amounts) {
        state
            .store
            .decrement(*hash, *amount)
            .await
            .map_err(|_| ApiError(ErrorCode::ServiceUnavailable))?;
    }
    state
        .store
        .decrement(taker_hash, taker_fill_amount)
        .await
        .map_err(|_| ApiError(ErrorCode::ServiceUnavailable))?;

    let now_ms = Utc::now().timestamp_millis();
    for ((maker, hash), amount) in maker_signed.iter().zip(&maker_hashes).zip(&maker_fill_amounts) {
        let fill = FillEvent {
            taker_order_hash: taker_hash,
            maker_order_hash: *hash,
            taker_owner,
            maker_owner: maker.order.maker,
            market: maker.order.market,
            token_id: maker.order.token_id,
            side: taker_side,
            price: maker.order.price(),
            size: *amount,
            timestamp_ms: now_ms,
        };
        state
            .stream
            .append(STREAM_FILLS, &fill_fields(&fill))
            .await
            .map_err(|_| ApiError(ErrorCode::ServiceUnavailable))?;
    }

    let job = MatchJob::new(taker_hash, taker_fill_amount, maker_hashes, maker_fill_amounts)
        .map_err(|_| ApiError(ErrorCode::ValidationError))?;
    state
        .stream
        .append(STREAM_MATCH_JOBS, &job_fields(&job))
        .await
        .map_err(|_| ApiError(ErrorCode::ServiceUnavailable))?;

    Ok(Json(SubmitOrderResponse {
        order_hash: encode_base58(&taker_hash),
        status: "matched",
        order: req.taker_order.order,
    }))
}

fn fill_fields(fill: &FillEvent) -> Vec<(String, String)> {
    vec![
        ("taker_order_hash".into(), encode_base58(&fill.taker_order_hash)),
        ("maker_order_hash".into(), encode_base58(&fill.maker_order_hash)),
        ("taker_owner".into(), fill.taker_owner.to_string()),
        ("maker_owner".into(), fill.maker_owner.to_string()),
        ("market".into(), fill.market.to_string()),
        ("token_id".into(), (fill.token_id as u8).to_string()),
        ("side".into(), (fill.side as u8).to_string()),
        ("price".into(), fill.price.to_string()),
        ("size".into(), fill.size.to_string()),
        ("timestamp_ms".into(), fill.timestamp_ms.to_string()),
    ]
}

fn job_fields(job: &MatchJob) -> Vec<(String, String)> {
    vec![
        ("taker_order_hash".into(), encode_base58(&job.taker_order_hash)),
        ("taker_fill_amount".into(), job.taker_fill_amount.to_string()),
        (
            "maker_order_hashes".into(),
            job.maker_order_hashes.iter().map(encode_base58).collect::<Vec<_>>().join(","),
        ),
        (
            "maker_fill_amounts".into(),
            job.maker_fill_amounts.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(","),
        ),
    ]
}

/// `GET /orders/:hash` — status lookup by fingerprint (§6).
pub async fn order_status<S, E, O>(
    State(state): State<Arc<AppState<S, E, O>>>,
    Path(hash): Path<String>,
) -> Result<Json<StatusResponse>, ApiError>
where
    S: OrderbookStore,
    O: OrderStatusOracle,
{
    let order_hash = decode_hash_param(&hash).map_err(|_| ApiError(ErrorCode::InvalidOrder))?;
    let record = state
        .store
        .get(order_hash)
        .await
        .map_err(|_| ApiError(ErrorCode::ServiceUnavailable))?;

    let Some(record) = record else {
        return Ok(Json(StatusResponse {
            exists: false,
            is_filled_or_cancelled: false,
            remaining: 0,
            status: "unknown".into(),
        }));
    };

    let is_filled_or_cancelled = matches!(record.status, OrderStatus::Matched | OrderStatus::Settled | OrderStatus::Cancelled);
    Ok(Json(StatusResponse {
        exists: true,
        is_filled_or_cancelled,
        remaining: record.remaining_amount,
        status: format!("{:?}", record.status).to_lowercase(),
    }))
}

/// `GET /nonce/:wallet` — nonce lookup (§6).
pub async fn nonce_lookup<S, E, O>(
    State(state): State<Arc<AppState<S, E, O>>>,
    Path(wallet): Path<String>,
) -> Result<Json<NonceResponse>, ApiError>
where
    O: OrderStatusOracle,
{
    let maker: Pubkey = wallet.parse().map_err(|_| ApiError(ErrorCode::InvalidOrder))?;
    let nonce = state
        .oracle
        .nonce_of(maker)
        .await
        .map_err(|_| ApiError(ErrorCode::ServiceUnavailable))?;
    Ok(Json(NonceResponse { nonce }))
}

#[derive(serde::Serialize)]
pub struct BookLevelDto {
    #[serde(rename = "orderHash")]
    order_hash: String,
    price: u64,
    remaining: u64,
    owner: String,
}

impl From<BookLevel> for BookLevelDto {
    fn from(level: BookLevel) -> Self {
        Self {
            order_hash: encode_base58(&level.order_hash),
            price: level.price,
            remaining: level.remaining,
            owner: level.owner.to_string(),
        }
    }
}

#[derive(serde::Serialize)]
pub struct OrderbookResponse {
    bids: Vec<BookLevelDto>,
    asks: Vec<BookLevelDto>,
}

/// `GET /orderbook/:market/:token` — top-20 per side snapshot (§6).
pub async fn orderbook_snapshot<S, E, O>(
    State(state): State<Arc<AppState<S, E, O>>>,
    Path((market, token)): Path<(String, u8)>,
) -> Result<Json<OrderbookResponse>, ApiError>
where
    S: OrderbookStore,
{
    let market: Pubkey = market.parse().map_err(|_| ApiError(ErrorCode::InvalidOrder))?;
    let token_id = TokenId::from_u8(token).ok_or(ApiError(ErrorCode::InvalidOrder))?;

    let bids = state
        .store
        .best_n(market, token_id, Side::Buy, 20)
        .await
        .map_err(|_| ApiError(ErrorCode::ServiceUnavailable))?;
    let asks = state
        .store
        .best_n(market, token_id, Side::Sell, 20)
        .await
        .map_err(|_| ApiError(ErrorCode::ServiceUnavailable))?;

    Ok(Json(OrderbookResponse {
        bids: bids.into_iter().map(Into::into).collect(),
        asks: asks.into_iter().map(Into::into).collect(),
    }))
}

pub async fn healthz() -> &'static str {
    "ok"
}
