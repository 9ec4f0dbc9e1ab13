mod redis_store;

pub use redis_store::RedisOrderbookStore;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::model::{OrderHash, OrderStatus, RestingOrder, Side, SignedOrder, TokenId};

/// One level of the book returned by `best_n`.
#[derive(Debug, Clone, Copy)]
pub struct BookLevel {
    pub order_hash: OrderHash,
    pub price: u64,
    pub remaining: u64,
    pub owner: Pubkey,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("order {0} not found")]
    NotFound(String),
    #[error("decrement of {delta} exceeds remaining {remaining}")]
    InsufficientRemaining { delta: u64, remaining: u64 },
    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),
    #[error("malformed cache record: {0}")]
    Malformed(String),
}

/// The orderbook store (C2): per-(market, token, side) ordered indices plus the signed-order
/// records themselves. Backed by the shared cache so C3 (inline) and cancellation paths
/// coordinate through a single synchronization point.
#[async_trait]
pub trait OrderbookStore: Send + Sync {
    /// Inserts a signed order. Duplicate insert (same fingerprint) is a no-op, not an error.
    async fn insert(&self, signed_order: SignedOrder) -> Result<RestingOrder, StoreError>;

    /// Up to `n` best-priced open orders (`remaining > 0`) for the given side.
    async fn best_n(
        &self,
        market: Pubkey,
        token: TokenId,
        side: Side,
        n: usize,
    ) -> Result<Vec<BookLevel>, StoreError>;

    /// Conditional decrement: succeeds only if `remaining >= delta`. CAS against the store;
    /// on success transitions `open -> partial -> matched` and, once fully filled, removes the
    /// order from its side index (the record itself is retained for history).
    async fn decrement(&self, order_hash: OrderHash, delta: u64) -> Result<(u64, OrderStatus), StoreError>;

    /// Removes an order from its side index and the maker's user index. If `mark_cancelled`,
    /// the record is retained with `status = cancelled`; otherwise it is left to expire via TTL.
    async fn remove(&self, order_hash: OrderHash, mark_cancelled: bool) -> Result<(), StoreError>;

    /// Fetches a resting order record by fingerprint.
    async fn get(&self, order_hash: OrderHash) -> Result<Option<RestingOrder>, StoreError>;

    /// Flips a record's status directly, bypassing `decrement`. Used by the settlement worker
    /// to mark `settled`/`failed` once the on-chain outcome is known — a transition that carries
    /// no remaining-amount change and so isn't a CAS candidate.
    async fn set_status(&self, order_hash: OrderHash, status: OrderStatus) -> Result<(), StoreError>;

    /// Outstanding fingerprints for a maker (for cancellation/reconciliation).
    async fn user_orders(&self, maker: Pubkey) -> Result<Vec<OrderHash>, StoreError>;
}
