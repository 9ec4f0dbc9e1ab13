use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;

use crate::model::order::encode_base58;
use crate::model::{FillEvent, OrderHash, OrderStatus, RestingOrder};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Relational ledger (C6's durable surface). All balance mutations funnel through the stored
/// procedures named in parentheses below rather than in-process arithmetic; this module only
/// marshals arguments and interprets idempotency conflicts.
#[derive(Clone)]
pub struct Ledger {
    pool: PgPool,
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

impl Ledger {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, LedgerError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// `true` if a row already exists for `(makerOrderHash, takerOrderHash)` — the fills
    /// idempotency key.
    pub async fn fill_exists(&self, maker_hash: OrderHash, taker_hash: OrderHash) -> Result<bool, LedgerError> {
        let row: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM order_fills WHERE maker_order_id = $1 AND taker_order_id = $2",
        )
        .bind(encode_base58(&maker_hash))
        .bind(encode_base58(&taker_hash))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// Upserts the fill row and appends a trade-history row in one transaction.
    pub async fn upsert_fill(&self, fill: &FillEvent) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO order_fills (maker_order_id, taker_order_id, market, token_id, side, price, size, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (maker_order_id, taker_order_id) DO NOTHING",
        )
        .bind(encode_base58(&fill.maker_order_hash))
        .bind(encode_base58(&fill.taker_order_hash))
        .bind(fill.market.to_string())
        .bind(fill.token_id as i16)
        .bind(fill.side as i16)
        .bind(fill.price as i64)
        .bind(fill.size as i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO trades (maker_order_id, taker_order_id, maker_owner, taker_owner, market, price, size, traded_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(encode_base58(&fill.maker_order_hash))
        .bind(encode_base58(&fill.taker_order_hash))
        .bind(fill.maker_owner.to_string())
        .bind(fill.taker_owner.to_string())
        .bind(fill.market.to_string())
        .bind(fill.price as i64)
        .bind(fill.size as i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Best-effort aggregate market stats update. Caller logs and continues on failure.
    pub async fn bump_market_stats(&self, market: solana_sdk::pubkey::Pubkey, size: u64) -> Result<(), LedgerError> {
        sqlx::query(
            "UPDATE markets SET volume = volume + $2, updated_at = $3 WHERE market_id = $1",
        )
        .bind(market.to_string())
        .bind(size as i64)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Upserts the mutable fields of an order record, keyed on its fingerprint.
    pub async fn upsert_order(&self, record: &RestingOrder) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO orders (order_hash, maker, market, token_id, side, maker_amount, taker_amount,
                                  status, filled_amount, remaining_amount, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             ON CONFLICT (order_hash) DO UPDATE SET
                status = EXCLUDED.status,
                filled_amount = EXCLUDED.filled_amount,
                remaining_amount = EXCLUDED.remaining_amount,
                updated_at = EXCLUDED.updated_at",
        )
        .bind(encode_base58(&record.order_hash))
        .bind(record.signed_order.order.maker.to_string())
        .bind(record.signed_order.order.market.to_string())
        .bind(record.signed_order.order.token_id as i16)
        .bind(record.signed_order.order.side as i16)
        .bind(record.signed_order.order.maker_amount as i64)
        .bind(record.signed_order.order.taker_amount as i64)
        .bind(status_str(record.status))
        .bind(record.filled_amount as i64)
        .bind(record.remaining_amount as i64)
        .bind(record.created_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn deposit_exists(&self, transaction_signature: &str) -> Result<bool, LedgerError> {
        let row: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM user_operations WHERE transaction_signature = $1")
                .bind(transaction_signature)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Upserts a deposit/withdrawal row, then applies the balance delta through the ledger's
    /// own stored procedure rather than in-process arithmetic.
    pub async fn upsert_operation_and_apply_balance(
        &self,
        transaction_signature: &str,
        owner: &str,
        op_kind: &str,
        token: &str,
        amount: &str,
    ) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO user_operations (transaction_signature, owner, kind, token, amount, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (transaction_signature) DO NOTHING",
        )
        .bind(transaction_signature)
        .bind(owner)
        .bind(op_kind)
        .bind(token)
        .bind(amount)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let proc_name = match op_kind {
            "deposit" => "deposit_usdc_balance",
            "withdraw" => "decrement_available_balance",
            other => return Err(LedgerError::Db(sqlx::Error::Protocol(format!("unknown op kind {other}")))),
        };
        sqlx::query(&format!("SELECT {proc_name}($1, $2, $3)"))
            .bind(owner)
            .bind(token)
            .bind(amount)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Bulk-upserts balance snapshots, `chunk_size` rows per statement, matching the
    /// cursor-scan-then-batch-upsert pattern the snapshot job uses.
    pub async fn snapshot_balances(&self, rows: &[(String, String, String)], chunk_size: usize) -> Result<(), LedgerError> {
        for chunk in rows.chunks(chunk_size.max(1)) {
            let mut tx = self.pool.begin().await?;
            for (user_id, balances_json, snapshot_at) in chunk {
                sqlx::query(
                    "INSERT INTO user_balances (user_id, balances, snapshotted_at)
                     VALUES ($1, $2::jsonb, $3)
                     ON CONFLICT (user_id) DO UPDATE SET balances = EXCLUDED.balances, snapshotted_at = EXCLUDED.snapshotted_at",
                )
                .bind(user_id)
                .bind(balances_json)
                .bind(snapshot_at)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
        }
        Ok(())
    }

    pub async fn market_title(&self, market: solana_sdk::pubkey::Pubkey) -> Result<Option<String>, LedgerError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT title FROM markets WHERE market_id = $1")
            .bind(market.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(title,)| title))
    }
}
