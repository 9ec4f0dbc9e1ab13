use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, warn};

use crate::model::order::decode_base58_32;
use crate::model::FillEvent;
use crate::shutdown;
use crate::store::OrderbookStore;
use crate::streams::{EventStream, StreamMessage, STREAM_DEPOSITS, STREAM_FILLS, STREAM_ORDERS, STREAM_WITHDRAWALS};
use crate::telemetry::PersistenceCounters;

use super::{BalanceSnapshotter, Ledger, MarketTitleCache, NotificationSink};

pub const PERSISTENCE_GROUP: &str = "persistence";

#[derive(Debug, Clone)]
pub struct PersistenceWorkerConfig {
    pub consumer_name: String,
    pub batch_size: usize,
    pub block_ms: u64,
    pub idle_reclaim_ms: u64,
    pub snapshot_every_n_iterations: u64,
}

pub struct PersistenceWorker<S, E, N> {
    store: Arc<S>,
    stream: Arc<E>,
    ledger: Ledger,
    notifier: Arc<N>,
    snapshotter: Option<BalanceSnapshotter>,
    market_titles: MarketTitleCache,
    config: PersistenceWorkerConfig,
    counters: PersistenceCounters,
}

impl<S, E, N> PersistenceWorker<S, E, N>
where
    S: OrderbookStore,
    E: EventStream,
    N: NotificationSink,
{
    pub fn new(
        store: Arc<S>,
        stream: Arc<E>,
        ledger: Ledger,
        notifier: Arc<N>,
        snapshotter: Option<BalanceSnapshotter>,
        market_titles: MarketTitleCache,
        config: PersistenceWorkerConfig,
    ) -> Self {
        Self {
            store,
            stream,
            ledger,
            notifier,
            snapshotter,
            market_titles,
            config,
            counters: PersistenceCounters::default(),
        }
    }

    pub async fn run(&self, shutdown_rx: watch::Receiver<bool>) -> anyhow::Result<()> {
        for stream_name in [STREAM_FILLS, STREAM_ORDERS, STREAM_DEPOSITS, STREAM_WITHDRAWALS] {
            self.stream.ensure_group(stream_name, PERSISTENCE_GROUP).await?;
        }

        let fills = self.consume_loop(STREAM_FILLS, shutdown_rx.clone());
        let orders = self.consume_loop(STREAM_ORDERS, shutdown_rx.clone());
        let deposits = self.consume_loop(STREAM_DEPOSITS, shutdown_rx.clone());
        let withdrawals = self.consume_loop(STREAM_WITHDRAWALS, shutdown_rx.clone());
        let snapshots = self.snapshot_loop(shutdown_rx.clone());

        let (f, o, d, w, _) = tokio::join!(fills, orders, deposits, withdrawals, snapshots);
        f?;
        o?;
        d?;
        w?;

        self.counters.log_summary();
        Ok(())
    }

    async fn consume_loop(&self, stream_name: &str, mut shutdown_rx: watch::Receiver<bool>) -> anyhow::Result<()> {
        while !shutdown::is_requested(&shutdown_rx) {
            let reclaimed = self
                .stream
                .claim_pending(
                    stream_name,
                    PERSISTENCE_GROUP,
                    &self.config.consumer_name,
                    self.config.idle_reclaim_ms,
                    self.config.batch_size,
                )
                .await?;
            for msg in &reclaimed {
                self.counters.inc_reclaimed();
                self.handle_message(stream_name, msg).await;
            }

            tokio::select! {
                result = self.stream.read_group(
                    stream_name,
                    PERSISTENCE_GROUP,
                    &self.config.consumer_name,
                    self.config.batch_size,
                    self.config.block_ms,
                ) => {
                    for msg in &result? {
                        self.handle_message(stream_name, msg).await;
                    }
                }
                _ = shutdown_rx.changed() => {
                    warn!("{stream_name} consumer observed shutdown signal mid-poll");
                }
            }
        }
        Ok(())
    }

    async fn handle_message(&self, stream_name: &str, msg: &StreamMessage) {
        let outcome = match stream_name {
            s if s == STREAM_FILLS => self.process_fill(msg).await,
            s if s == STREAM_ORDERS => self.process_order(msg).await,
            s if s == STREAM_DEPOSITS => self.process_operation(msg, "deposit").await,
            s if s == STREAM_WITHDRAWALS => self.process_operation(msg, "withdraw").await,
            other => {
                warn!("no handler registered for stream {other}");
                Ok(())
            }
        };

        match outcome {
            Ok(()) => {
                if let Err(e) = self.stream.ack(stream_name, PERSISTENCE_GROUP, &msg.id).await {
                    error!("failed to ack {stream_name} message {}: {e}", msg.id);
                } else {
                    self.counters.inc_acked();
                }
            }
            Err(e) => {
                self.counters.inc_retried();
                error!("{stream_name} message {} left unacked: {e}", msg.id);
            }
        }
    }

    async fn process_fill(&self, msg: &StreamMessage) -> anyhow::Result<()> {
        let fill = parse_fill(msg)?;

        if self.ledger.fill_exists(fill.maker_order_hash, fill.taker_order_hash).await? {
            self.counters.inc_duplicates_skipped();
            return Ok(());
        }

        self.ledger.upsert_fill(&fill).await?;

        if let Err(e) = self.ledger.bump_market_stats(fill.market, fill.size).await {
            warn!("market stats update failed for {}: {e}", fill.market);
        }

        let market_title = match self.market_titles.get_or_fetch(&self.ledger, fill.market).await {
            Ok(title) => title,
            Err(e) => {
                warn!("market title lookup failed for {}: {e}", fill.market);
                None
            }
        };

        self.notifier
            .notify_trade(fill.maker_owner, fill.market, market_title.as_deref(), fill.price, fill.size)
            .await;
        if fill.taker_owner != fill.maker_owner {
            self.notifier
                .notify_trade(fill.taker_owner, fill.market, market_title.as_deref(), fill.price, fill.size)
                .await;
        }

        Ok(())
    }

    async fn process_order(&self, msg: &StreamMessage) -> anyhow::Result<()> {
        let raw = msg
            .fields
            .get("order_hash")
            .ok_or_else(|| anyhow::anyhow!("missing order_hash"))?;
        let hash = decode_base58_32(raw)?;
        match self.store.get(hash).await? {
            Some(record) => self.ledger.upsert_order(&record).await.map_err(Into::into),
            None => {
                warn!("order {} referenced by stream but absent from store", raw);
                Ok(())
            }
        }
    }

    async fn process_operation(&self, msg: &StreamMessage, kind: &str) -> anyhow::Result<()> {
        let get = |field: &str| -> anyhow::Result<&str> {
            msg.fields
                .get(field)
                .map(|s| s.as_str())
                .ok_or_else(|| anyhow::anyhow!("missing {field}"))
        };
        let transaction_signature = get("transaction_signature")?;
        let owner = get("owner")?;
        let token = get("token")?;
        let amount = get("amount")?;

        if self.ledger.deposit_exists(transaction_signature).await? {
            self.counters.inc_duplicates_skipped();
            return Ok(());
        }

        self.ledger
            .upsert_operation_and_apply_balance(transaction_signature, owner, kind, token, amount)
            .await?;
        Ok(())
    }

    async fn snapshot_loop(&self, mut shutdown_rx: watch::Receiver<bool>) -> anyhow::Result<()> {
        let Some(snapshotter) = &self.snapshotter else {
            return Ok(());
        };
        let period = Duration::from_millis(self.config.block_ms * self.config.snapshot_every_n_iterations.max(1));
        let mut ticker = tokio::time::interval(period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match snapshotter.run_once(&self.ledger).await {
                        Ok(n) => tracing::info!(rows = n, "balance snapshot complete"),
                        Err(e) => error!("balance snapshot failed: {e}"),
                    }
                }
                _ = shutdown_rx.changed() => return Ok(()),
            }
            if shutdown::is_requested(&shutdown_rx) {
                return Ok(());
            }
        }
    }
}

fn parse_fill(msg: &StreamMessage) -> anyhow::Result<FillEvent> {
    let get = |field: &str| -> anyhow::Result<&str> {
        msg.fields
            .get(field)
            .map(|s| s.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing {field}"))
    };
    Ok(FillEvent {
        taker_order_hash: decode_base58_32(get("taker_order_hash")?)?,
        maker_order_hash: decode_base58_32(get("maker_order_hash")?)?,
        taker_owner: get("taker_owner")?.parse()?,
        maker_owner: get("maker_owner")?.parse()?,
        market: get("market")?.parse()?,
        token_id: crate::model::TokenId::from_u8(get("token_id")?.parse()?)
            .ok_or_else(|| anyhow::anyhow!("bad token_id"))?,
        side: crate::model::Side::from_u8(get("side")?.parse()?).ok_or_else(|| anyhow::anyhow!("bad side"))?,
        price: get("price")?.parse()?,
        size: get("size")?.parse()?,
        timestamp_ms: get("timestamp_ms")?.parse()?,
    })
}
