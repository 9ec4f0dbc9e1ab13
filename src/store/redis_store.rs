use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use solana_sdk::pubkey::Pubkey;

use crate::model::order::{decode_base58_32, encode_base58, Order, Side, SignedOrder, TokenId};
use crate::model::{OrderHash, OrderStatus, RestingOrder};

use super::{BookLevel, OrderbookStore, StoreError};

fn order_key(hash: OrderHash) -> String {
    format!("order:{}", encode_base58(&hash))
}

fn side_index_key(market: Pubkey, token: TokenId, side: Side) -> String {
    let side_name = match side {
        Side::Buy => "bids",
        Side::Sell => "asks",
    };
    format!("ob:{}:{}:{}", market, token as u8, side_name)
}

fn user_orders_key(maker: Pubkey) -> String {
    format!("user:{maker}:orders")
}

fn status_str(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Open => "open",
        OrderStatus::Partial => "partial",
        OrderStatus::Matched => "matched",
        OrderStatus::Settled => "settled",
        OrderStatus::Failed => "failed",
        OrderStatus::Cancelled => "cancelled",
    }
}

fn status_from_str(s: &str) -> Result<OrderStatus, StoreError> {
    match s {
        "open" => Ok(OrderStatus::Open),
        "partial" => Ok(OrderStatus::Partial),
        "matched" => Ok(OrderStatus::Matched),
        "settled" => Ok(OrderStatus::Settled),
        "failed" => Ok(OrderStatus::Failed),
        "cancelled" => Ok(OrderStatus::Cancelled),
        other => Err(StoreError::Malformed(format!("unknown status {other}"))),
    }
}

/// Packs `(price, sequence)` into the single f64 score a sorted set needs.
///
/// `seq` is a process-local monotonic counter standing in for wall-clock arrival order — it
/// grows strictly with insertion order, which is what the price-time tiebreak needs. Scores
/// that still tie (sequence wrapped past `SEQ_SPACE`) fall back to Redis's own lexicographic
/// ordering by member, which is exactly the final `orderHash` tiebreak the index wants.
const SEQ_SPACE: f64 = 1_000_000_000.0;

fn score_for(side: Side, price: u64, seq: u64) -> f64 {
    let signed_price = match side {
        Side::Buy => -(price as f64), // ascending ZRANGE over negative price = highest price first
        Side::Sell => price as f64,
    };
    signed_price * SEQ_SPACE + (seq as f64 % SEQ_SPACE)
}

/// Conditional decrement, run server-side so the read-check-write is atomic regardless of how
/// many tasks share the multiplexed `ConnectionManager` connection. `WATCH`/`MULTI`/`EXEC` only
/// isolates a transaction on a dedicated connection; a script is the documented way to get the
/// same guarantee over a pooled/multiplexed one.
///
/// KEYS[1] = order hash key, ARGV[1] = delta, ARGV[2] = order hash (zset member, base58).
/// Returns `(new_remaining, new_status)` on success; a custom error reply (`NOTFOUND` or
/// `INSUFFICIENT <remaining>`) otherwise.
const DECREMENT_SCRIPT_SRC: &str = r#"
local remaining = redis.call('HGET', KEYS[1], 'remaining_amount')
if not remaining then
  return redis.error_reply('NOTFOUND')
end
remaining = tonumber(remaining)
local delta = tonumber(ARGV[1])
if delta > remaining then
  return redis.error_reply('INSUFFICIENT ' .. remaining)
end
local filled = tonumber(redis.call('HGET', KEYS[1], 'filled_amount'))
local new_remaining = remaining - delta
local new_filled = filled + delta
local new_status = 'partial'
if new_remaining == 0 then
  new_status = 'matched'
end
redis.call('HSET', KEYS[1], 'remaining_amount', new_remaining, 'filled_amount', new_filled, 'status', new_status)
if new_remaining == 0 then
  local market = redis.call('HGET', KEYS[1], 'market')
  local token_id = redis.call('HGET', KEYS[1], 'token_id')
  local side = redis.call('HGET', KEYS[1], 'side')
  local side_name = 'asks'
  if side == '0' then
    side_name = 'bids'
  end
  local index_key = 'ob:' .. market .. ':' .. token_id .. ':' .. side_name
  redis.call('ZREM', index_key, ARGV[2])
end
return {new_remaining, new_status}
"#;

fn decrement_script() -> &'static Script {
    static SCRIPT: OnceLock<Script> = OnceLock::new();
    SCRIPT.get_or_init(|| Script::new(DECREMENT_SCRIPT_SRC))
}

/// Orderbook store backed by a shared Redis/cache deployment, per the key layout of §6.
pub struct RedisOrderbookStore {
    conn: ConnectionManager,
    seq: AtomicU64,
}

impl RedisOrderbookStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            seq: AtomicU64::new(0),
        }
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    async fn read_record(
        &self,
        conn: &mut ConnectionManager,
        hash: OrderHash,
    ) -> Result<Option<RestingOrder>, StoreError> {
        let key = order_key(hash);
        let fields: HashMap<String, String> = conn.hgetall(&key).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Self::record_from_fields(hash, &fields).map(Some)
    }

    fn record_from_fields(hash: OrderHash, fields: &HashMap<String, String>) -> Result<RestingOrder, StoreError> {
        let get = |k: &str| -> Result<&String, StoreError> {
            fields.get(k).ok_or_else(|| StoreError::Malformed(format!("missing field {k}")))
        };
        let order_b64 = get("order_b64")?;
        let sig_b64 = get("sig_b64")?;
        let order_bytes =
            base64::Engine::decode(&base64::engine::general_purpose::STANDARD, order_b64)
                .map_err(|e| StoreError::Malformed(e.to_string()))?;
        let sig_bytes =
            base64::Engine::decode(&base64::engine::general_purpose::STANDARD, sig_b64)
                .map_err(|e| StoreError::Malformed(e.to_string()))?;
        let order = Order::deserialize(&order_bytes).map_err(|e| StoreError::Malformed(e.to_string()))?;
        let mut signature = [0u8; 64];
        if sig_bytes.len() != 64 {
            return Err(StoreError::Malformed("signature must be 64 bytes".into()));
        }
        signature.copy_from_slice(&sig_bytes);

        let status = status_from_str(get("status")?)?;
        let filled_amount: u64 = get("filled_amount")?
            .parse()
            .map_err(|_| StoreError::Malformed("bad filled_amount".into()))?;
        let remaining_amount: u64 = get("remaining_amount")?
            .parse()
            .map_err(|_| StoreError::Malformed("bad remaining_amount".into()))?;
        let created_at: DateTime<Utc> = DateTime::from_str(get("created_at")?)
            .map_err(|_| StoreError::Malformed("bad created_at".into()))?;

        Ok(RestingOrder {
            order_hash: hash,
            signed_order: SignedOrder { order, signature },
            status,
            filled_amount,
            remaining_amount,
            created_at,
        })
    }

    fn fields_for(record: &RestingOrder) -> Vec<(String, String)> {
        let order_b64 = base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            record.signed_order.order.serialize(),
        );
        let sig_b64 = base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            record.signed_order.signature,
        );
        vec![
            ("order_b64".into(), order_b64),
            ("sig_b64".into(), sig_b64),
            ("status".into(), status_str(record.status).into()),
            ("filled_amount".into(), record.filled_amount.to_string()),
            ("remaining_amount".into(), record.remaining_amount.to_string()),
            ("created_at".into(), record.created_at.to_rfc3339()),
            ("market".into(), record.signed_order.order.market.to_string()),
            ("token_id".into(), (record.signed_order.order.token_id as u8).to_string()),
            ("side".into(), (record.signed_order.order.side as u8).to_string()),
            ("maker".into(), record.signed_order.order.maker.to_string()),
        ]
    }
}

#[async_trait]
impl OrderbookStore for RedisOrderbookStore {
    async fn insert(&self, signed_order: SignedOrder) -> Result<RestingOrder, StoreError> {
        let hash = signed_order.order_hash();
        let key = order_key(hash);
        let mut conn = self.conn.clone();

        if let Some(existing) = self.read_record(&mut conn, hash).await? {
            return Ok(existing); // duplicate insert is a no-op
        }

        let record = RestingOrder::new(signed_order, Utc::now());
        let fields = Self::fields_for(&record);
        let order = &record.signed_order.order;
        let index_key = side_index_key(order.market, order.token_id, order.side);
        let score = score_for(order.side, order.price(), self.next_seq());

        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset_multiple(&key, &fields)
            .ignore()
            .zadd(&index_key, encode_base58(&hash), score)
            .ignore()
            .sadd(user_orders_key(order.maker), encode_base58(&hash))
            .ignore();
        if order.expiration > 0 {
            let ttl = (order.expiration - Utc::now().timestamp()).max(0);
            pipe.expire(&key, ttl).ignore();
        }
        pipe.query_async::<_, ()>(&mut conn).await?;

        Ok(record)
    }

    async fn best_n(
        &self,
        market: Pubkey,
        token: TokenId,
        side: Side,
        n: usize,
    ) -> Result<Vec<BookLevel>, StoreError> {
        let mut conn = self.conn.clone();
        let index_key = side_index_key(market, token, side);
        let members: Vec<String> = conn.zrange(&index_key, 0, (n.max(1) - 1) as isize).await?;

        let mut levels = Vec::with_capacity(members.len());
        for member in members {
            let hash = decode_base58_32(&member).map_err(|e| StoreError::Malformed(e.to_string()))?;
            if let Some(record) = self.read_record(&mut conn, hash).await? {
                if record.remaining_amount > 0 {
                    levels.push(BookLevel {
                        order_hash: hash,
                        price: record.signed_order.order.price(),
                        remaining: record.remaining_amount,
                        owner: record.signed_order.order.maker,
                    });
                }
            }
        }
        Ok(levels)
    }

    async fn decrement(&self, order_hash: OrderHash, delta: u64) -> Result<(u64, OrderStatus), StoreError> {
        let key = order_key(order_hash);
        let mut conn = self.conn.clone();

        let result: Result<(u64, String), redis::RedisError> = decrement_script()
            .key(&key)
            .arg(delta)
            .arg(encode_base58(&order_hash))
            .invoke_async(&mut conn)
            .await;

        match result {
            Ok((new_remaining, status)) => Ok((new_remaining, status_from_str(&status)?)),
            Err(e) => match e.code() {
                Some("NOTFOUND") => Err(StoreError::NotFound(encode_base58(&order_hash))),
                Some("INSUFFICIENT") => {
                    let remaining = e.detail().and_then(|d| d.trim().parse().ok()).unwrap_or(0);
                    Err(StoreError::InsufficientRemaining { delta, remaining })
                }
                _ => Err(StoreError::Cache(e)),
            },
        }
    }

    async fn remove(&self, order_hash: OrderHash, mark_cancelled: bool) -> Result<(), StoreError> {
        let key = order_key(order_hash);
        let mut conn = self.conn.clone();
        let Some(record) = self.read_record(&mut conn, order_hash).await? else {
            return Ok(());
        };
        let order = &record.signed_order.order;
        let index_key = side_index_key(order.market, order.token_id, order.side);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .zrem(&index_key, encode_base58(&order_hash))
            .ignore()
            .srem(user_orders_key(order.maker), encode_base58(&order_hash))
            .ignore();
        if mark_cancelled {
            pipe.hset(&key, "status", status_str(OrderStatus::Cancelled)).ignore();
        } else {
            pipe.del(&key).ignore();
        }
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn get(&self, order_hash: OrderHash) -> Result<Option<RestingOrder>, StoreError> {
        let mut conn = self.conn.clone();
        self.read_record(&mut conn, order_hash).await
    }

    async fn set_status(&self, order_hash: OrderHash, status: OrderStatus) -> Result<(), StoreError> {
        let key = order_key(order_hash);
        let mut conn = self.conn.clone();
        let _: () = conn.hset(&key, "status", status_str(status)).await?;
        Ok(())
    }

    async fn user_orders(&self, maker: Pubkey) -> Result<Vec<OrderHash>, StoreError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(user_orders_key(maker)).await?;
        members
            .into_iter()
            .map(|m| decode_base58_32(&m).map_err(|e| StoreError::Malformed(e.to_string())))
            .collect()
    }
}
