use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;

use super::{EventStream, StreamError, StreamMessage};

/// Event stream backed by Redis Streams (`XADD`/`XREADGROUP`/`XAUTOCLAIM`/`XACK`).
pub struct RedisEventStream {
    conn: ConnectionManager,
}

impl RedisEventStream {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

fn fields_from_reply(fields: Vec<(String, redis::Value)>) -> std::collections::HashMap<String, String> {
    fields
        .into_iter()
        .filter_map(|(k, v)| match v {
            redis::Value::BulkString(bytes) => Some((k, String::from_utf8_lossy(&bytes).into_owned())),
            redis::Value::SimpleString(s) => Some((k, s)),
            _ => None,
        })
        .collect()
}

#[async_trait]
impl EventStream for RedisEventStream {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), StreamError> {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match result {
            Ok(()) => Ok(()),
            // BUSYGROUP means the group already exists — idempotent success.
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn append(&self, stream: &str, fields: &[(String, String)]) -> Result<String, StreamError> {
        let mut conn = self.conn.clone();
        let id: String = conn.xadd(stream, "*", fields).await?;
        Ok(id)
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<StreamMessage>, StreamError> {
        let mut conn = self.conn.clone();
        let opts = StreamReadOptions::default()
            .group(group, consumer)
            .count(count)
            .block(block_ms as usize);
        let reply: StreamReadReply = conn.xread_options(&[stream], &[">"], &opts).await?;

        let mut out = Vec::new();
        for key in reply.keys {
            for id in key.ids {
                out.push(StreamMessage {
                    id: id.id,
                    fields: fields_from_reply(id.map.into_iter().collect()),
                });
            }
        }
        Ok(out)
    }

    async fn claim_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        idle_ms: u64,
        count: usize,
    ) -> Result<Vec<StreamMessage>, StreamError> {
        let mut conn = self.conn.clone();
        let reply: redis::streams::StreamAutoClaimReply = conn
            .xautoclaim_options(
                stream,
                group,
                consumer,
                idle_ms as usize,
                "0",
                redis::streams::StreamAutoClaimOptions::default().count(count),
            )
            .await?;

        Ok(reply
            .claimed
            .into_iter()
            .map(|id| StreamMessage {
                id: id.id,
                fields: fields_from_reply(id.map.into_iter().collect()),
            })
            .collect())
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<(), StreamError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.xack(stream, group, &[id]).await?;
        Ok(())
    }
}
