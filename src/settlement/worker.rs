use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::model::order::{decode_base58_32, encode_base58};
use crate::model::{MatchJob, OrderHash, OrderStatus, RestingOrder};
use crate::shutdown;
use crate::store::OrderbookStore;
use crate::streams::{EventStream, StreamMessage, STREAM_MATCH_JOBS, STREAM_ORDERS};
use crate::telemetry::SettlementCounters;

use super::OnchainSettlementClient;

pub const SETTLEMENT_GROUP: &str = "settlement";
/// Parking list for jobs that exhausted their retry budget (§4.5's "failed list").
pub const STREAM_SETTLEMENT_FAILED: &str = "stream:settlement_failed";

#[derive(Debug, Clone)]
pub struct SettlementWorkerConfig {
    pub consumer_name: String,
    pub submit_timeout: Duration,
    pub base_backoff: Duration,
    pub max_attempts: u32,
    pub idle_reclaim_ms: u64,
}

pub struct SettlementWorker<S, E, C> {
    store: Arc<S>,
    stream: Arc<E>,
    chain: Arc<C>,
    config: SettlementWorkerConfig,
    counters: SettlementCounters,
}

impl<S, E, C> SettlementWorker<S, E, C>
where
    S: OrderbookStore,
    E: EventStream,
    C: OnchainSettlementClient,
{
    pub fn new(store: Arc<S>, stream: Arc<E>, chain: Arc<C>, config: SettlementWorkerConfig) -> Self {
        Self {
            store,
            stream,
            chain,
            config,
            counters: SettlementCounters::default(),
        }
    }

    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) -> anyhow::Result<()> {
        self.stream.ensure_group(STREAM_MATCH_JOBS, SETTLEMENT_GROUP).await?;

        while !shutdown::is_requested(&shutdown_rx) {
            let reclaimed = self
                .stream
                .claim_pending(
                    STREAM_MATCH_JOBS,
                    SETTLEMENT_GROUP,
                    &self.config.consumer_name,
                    self.config.idle_reclaim_ms,
                    10,
                )
                .await?;
            for msg in reclaimed {
                self.handle_message(msg).await;
            }

            tokio::select! {
                result = self.stream.read_group(
                    STREAM_MATCH_JOBS,
                    SETTLEMENT_GROUP,
                    &self.config.consumer_name,
                    10,
                    5_000,
                ) => {
                    for msg in result? {
                        self.handle_message(msg).await;
                    }
                }
                _ = shutdown_rx.changed() => {
                    warn!("settlement worker observed shutdown signal mid-poll");
                }
            }
        }

        self.counters.log_summary();
        Ok(())
    }

    async fn handle_message(&self, msg: StreamMessage) {
        match self.process_job(&msg).await {
            Ok(()) => {
                if let Err(e) = self.stream.ack(STREAM_MATCH_JOBS, SETTLEMENT_GROUP, &msg.id).await {
                    error!("failed to ack settlement message {}: {e}", msg.id);
                }
            }
            Err(e) => {
                // Not acked: the message stays pending and is reclaimed on a future pass.
                error!("settlement job {} left unacked: {e}", msg.id);
            }
        }
    }

    async fn process_job(&self, msg: &StreamMessage) -> anyhow::Result<()> {
        let job = parse_job(msg)?;

        let taker = match self.store.get(job.taker_order_hash).await? {
            Some(r) => r,
            None => {
                warn!("taker {} missing at settlement time; failing job", encode_base58(&job.taker_order_hash));
                for maker_hash in &job.maker_order_hashes {
                    let _ = self.store.set_status(*maker_hash, OrderStatus::Failed).await;
                }
                self.counters.inc_failed();
                return Ok(());
            }
        };

        let mut makers = Vec::new();
        for maker_hash in &job.maker_order_hashes {
            if let Some(record) = self.store.get(*maker_hash).await? {
                makers.push(record);
            }
        }
        if makers.is_empty() {
            warn!("no maker records survived for job on taker {}", encode_base58(&job.taker_order_hash));
            self.store.set_status(job.taker_order_hash, OrderStatus::Failed).await?;
            self.counters.inc_failed();
            return Ok(());
        }

        self.submit_with_retry(&job, &taker, &makers).await
    }

    async fn submit_with_retry(&self, job: &MatchJob, taker: &RestingOrder, makers: &[RestingOrder]) -> anyhow::Result<()> {
        let mut attempt = 0u32;
        loop {
            let outcome = tokio::time::timeout(
                self.config.submit_timeout,
                self.chain.submit_settlement(job, taker, makers),
            )
            .await;

            match outcome {
                Ok(Ok(receipt)) => {
                    info!(signature = %receipt.signature, "settlement submitted");
                    self.mark_settled(taker, makers).await?;
                    self.counters.inc_succeeded();
                    return Ok(());
                }
                Ok(Err(e)) => {
                    warn!("settlement attempt {attempt} failed: {e}");
                }
                Err(_) => {
                    warn!("settlement attempt {attempt} timed out after {:?}", self.config.submit_timeout);
                }
            }

            attempt += 1;
            if attempt >= self.config.max_attempts {
                self.park_failed_job(job).await?;
                self.mark_failed(taker, makers).await?;
                self.counters.inc_failed();
                return Ok(());
            }
            self.counters.inc_retried();
            let delay = self.config.base_backoff * 2u32.pow(attempt - 1);
            tokio::time::sleep(delay).await;
        }
    }

    async fn mark_settled(&self, taker: &RestingOrder, makers: &[RestingOrder]) -> anyhow::Result<()> {
        self.store.set_status(taker.order_hash, OrderStatus::Settled).await?;
        self.stream.append(STREAM_ORDERS, &order_update_fields(taker.order_hash, OrderStatus::Settled)).await?;
        for maker in makers {
            self.store.set_status(maker.order_hash, OrderStatus::Settled).await?;
            self.stream
                .append(STREAM_ORDERS, &order_update_fields(maker.order_hash, OrderStatus::Settled))
                .await?;
        }
        Ok(())
    }

    async fn mark_failed(&self, taker: &RestingOrder, makers: &[RestingOrder]) -> anyhow::Result<()> {
        self.store.set_status(taker.order_hash, OrderStatus::Failed).await?;
        for maker in makers {
            self.store.set_status(maker.order_hash, OrderStatus::Failed).await?;
        }
        Ok(())
    }

    async fn park_failed_job(&self, job: &MatchJob) -> anyhow::Result<()> {
        self.counters.inc_requeued();
        self.stream.append(STREAM_SETTLEMENT_FAILED, &job_fields(job)).await?;
        Ok(())
    }
}

fn order_update_fields(order_hash: OrderHash, status: OrderStatus) -> Vec<(String, String)> {
    let status_str = match status {
        OrderStatus::Open => "open",
        OrderStatus::Partial => "partial",
        OrderStatus::Matched => "matched",
        OrderStatus::Settled => "settled",
        OrderStatus::Failed => "failed",
        OrderStatus::Cancelled => "cancelled",
    };
    vec![
        ("order_hash".into(), encode_base58(&order_hash)),
        ("status".into(), status_str.into()),
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

fn parse_job(msg: &StreamMessage) -> anyhow::Result<MatchJob> {
    let taker_order_hash = decode_hash(msg, "taker_order_hash")?;
    let taker_fill_amount: u64 = msg
        .fields
        .get("taker_fill_amount")
        .ok_or_else(|| anyhow::anyhow!("missing taker_fill_amount"))?
        .parse()?;
    let maker_order_hashes = msg
        .fields
        .get("maker_order_hashes")
        .ok_or_else(|| anyhow::anyhow!("missing maker_order_hashes"))?
        .split(',')
        .filter(|s| !s.is_empty())
        .map(decode_base58_32)
        .collect::<Result<Vec<_>, _>>()?;
    let maker_fill_amounts = msg
        .fields
        .get("maker_fill_amounts")
        .ok_or_else(|| anyhow::anyhow!("missing maker_fill_amounts"))?
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u64>())
        .collect::<Result<Vec<_>, _>>()?;

    Ok(MatchJob::new(taker_order_hash, taker_fill_amount, maker_order_hashes, maker_fill_amounts)?)
}

fn decode_hash(msg: &StreamMessage, field: &str) -> anyhow::Result<OrderHash> {
    let raw = msg.fields.get(field).ok_or_else(|| anyhow::anyhow!("missing {field}"))?;
    Ok(decode_base58_32(raw)?)
}
