use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::ledger::{Ledger, LedgerError};

const SCAN_COUNT: usize = 100;
const UPSERT_CHUNK: usize = 50;

/// Periodically snapshots `bal:*` cache entries into the ledger's balance table.
///
/// Uses a cursor-based `SCAN` rather than `KEYS` so the cache is never blocked by a full
/// keyspace walk, matching the non-blocking-iteration requirement on the balance job.
pub struct BalanceSnapshotter {
    conn: ConnectionManager,
}

impl BalanceSnapshotter {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn run_once(&self, ledger: &Ledger) -> Result<usize, LedgerError> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut total = 0usize;
        let mut batch = Vec::with_capacity(UPSERT_CHUNK);

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg("bal:*")
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;

            for key in keys {
                let user_id = key.trim_start_matches("bal:").to_string();
                let fields: std::collections::HashMap<String, String> = conn.hgetall(&key).await?;
                let balances_json = serde_json::to_string(&fields).unwrap_or_else(|_| "{}".into());
                batch.push((user_id, balances_json, Utc::now().to_rfc3339()));
                total += 1;

                if batch.len() >= UPSERT_CHUNK {
                    ledger.snapshot_balances(&batch, UPSERT_CHUNK).await?;
                    batch.clear();
                }
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        if !batch.is_empty() {
            ledger.snapshot_balances(&batch, UPSERT_CHUNK).await?;
        }

        Ok(total)
    }
}
