mod redis_stream;

pub use redis_stream::RedisEventStream;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

pub const STREAM_ORDERS: &str = "stream:orders";
pub const STREAM_FILLS: &str = "stream:fills";
pub const STREAM_DEPOSITS: &str = "stream:deposits";
pub const STREAM_WITHDRAWALS: &str = "stream:withdrawals";
/// Settlement queue — carries `MatchJob`s from C3 to C5. Modeled as a stream (not a plain
/// list) so multiple settlement workers can share consumer-group distribution and pending-claim
/// recovery the same way C6 does for the other three streams.
pub const STREAM_MATCH_JOBS: &str = "stream:match_jobs";

/// Default idle threshold before a pending message is eligible for reclaim by another consumer.
pub const DEFAULT_IDLE_MS: u64 = 60_000;

#[derive(Debug, Clone)]
pub struct StreamMessage {
    pub id: String,
    pub fields: HashMap<String, String>,
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),
}

/// Append-only event log with consumer-group semantics (C4). Delivery is at-least-once;
/// consumers must be idempotent. Ordering is strictly monotonic within a stream, unordered
/// across streams.
#[async_trait]
pub trait EventStream: Send + Sync {
    /// Ensures the consumer group exists (idempotent; creates the stream if needed).
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), StreamError>;

    /// Appends a message, returning its assigned id.
    async fn append(&self, stream: &str, fields: &[(String, String)]) -> Result<String, StreamError>;

    /// Reads up to `count` messages not yet delivered to this group, blocking up to `block_ms`.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<StreamMessage>, StreamError>;

    /// Reassigns messages idle for at least `idle_ms` in this group to `consumer`.
    async fn claim_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        idle_ms: u64,
        count: usize,
    ) -> Result<Vec<StreamMessage>, StreamError>;

    /// Acknowledges successful processing of `id`.
    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<(), StreamError>;
}
