use chrono::Utc;
use thiserror::Error;

use crate::model::order::SignedOrder;
use crate::model::{FillEvent, MatchJob, MatchJobError, OrderHash};
use crate::store::{OrderbookStore, StoreError};
use crate::streams::{EventStream, StreamError, STREAM_FILLS, STREAM_MATCH_JOBS};

/// Candidates fetched per batch attempt, beyond the 5-leg settlement cap, to absorb
/// self-trade skips and lost CAS races without an extra round-trip to the store.
const OVERFETCH_FACTOR: usize = 4;

#[derive(Debug, Error)]
pub enum MatchError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Job(#[from] MatchJobError),
}

/// Result of running a taker order through the book.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub taker_order_hash: OrderHash,
    pub filled_amount: u64,
    pub fills: Vec<FillEvent>,
    pub match_jobs: Vec<MatchJob>,
}

/// Crosses a resting taker order against the opposite side of the book (C3).
///
/// The taker is assumed already present in the store (inserted by the intake path before
/// `try_match` runs) so its remaining amount can be CAS-decremented the same way a maker's
/// is. This keeps a single synchronization primitive — the store's `decrement` — for both
/// sides instead of tracking the taker's remaining amount out of band.
pub struct MatchingEngine<S, E> {
    store: std::sync::Arc<S>,
    stream: std::sync::Arc<E>,
}

impl<S, E> MatchingEngine<S, E>
where
    S: OrderbookStore,
    E: EventStream,
{
    pub fn new(store: std::sync::Arc<S>, stream: std::sync::Arc<E>) -> Self {
        Self { store, stream }
    }

    pub async fn try_match(&self, taker: SignedOrder) -> Result<MatchOutcome, MatchError> {
        let taker_hash = taker.order_hash();
        let opposite_side = taker.order.side.opposite();
        let mut total_filled = 0u64;
        let mut all_fills = Vec::new();
        let mut all_jobs = Vec::new();

        loop {
            let taker_record = match self.store.get(taker_hash).await? {
                Some(r) => r,
                None => break,
            };
            if taker_record.remaining_amount == 0 {
                break;
            }

            let overfetch = MatchJob::MAX_LEGS * OVERFETCH_FACTOR;
            let candidates = self
                .store
                .best_n(taker.order.market, taker.order.token_id, opposite_side, overfetch)
                .await?;

            let mut leg_hashes = Vec::new();
            let mut leg_amounts = Vec::new();
            let mut batch_fills = Vec::new();
            let mut remaining = taker_record.remaining_amount;

            for candidate in candidates {
                if remaining == 0 || leg_hashes.len() == MatchJob::MAX_LEGS {
                    break;
                }
                if candidate.owner == taker.order.maker {
                    continue; // self-trade: skip this resting order, keep scanning
                }
                if !crosses(taker.order.side, taker.order.price(), candidate.price) {
                    break; // book is price-time sorted: nothing further down the side crosses
                }

                let fill_amount = remaining.min(candidate.remaining);
                match self.store.decrement(candidate.order_hash, fill_amount).await {
                    Ok(_) => {}
                    Err(StoreError::InsufficientRemaining { .. }) | Err(StoreError::NotFound(_)) => {
                        continue; // lost the CAS race or order was cancelled concurrently
                    }
                    Err(e) => return Err(e.into()),
                }

                remaining -= fill_amount;
                leg_hashes.push(candidate.order_hash);
                leg_amounts.push(fill_amount);
                batch_fills.push(FillEvent {
                    taker_order_hash: taker_hash,
                    maker_order_hash: candidate.order_hash,
                    taker_owner: taker.order.maker,
                    maker_owner: candidate.owner,
                    market: taker.order.market,
                    token_id: taker.order.token_id,
                    side: taker.order.side,
                    price: candidate.price, // maker price wins
                    size: fill_amount,
                    timestamp_ms: Utc::now().timestamp_millis(),
                });
            }

            if leg_hashes.is_empty() {
                break; // nothing crossable left; taker rests with whatever remains
            }

            let batch_filled: u64 = leg_amounts.iter().sum();
            self.store.decrement(taker_hash, batch_filled).await?;

            for fill in &batch_fills {
                let fields = fill_fields(fill);
                self.stream.append(STREAM_FILLS, &fields).await?;
            }

            let job = MatchJob::new(taker_hash, batch_filled, leg_hashes, leg_amounts)?;
            let job_fields = job_fields(&job)?;
            self.stream.append(STREAM_MATCH_JOBS, &job_fields).await?;

            total_filled += batch_filled;
            all_fills.extend(batch_fills);
            all_jobs.push(job);

            if remaining == 0 {
                break;
            }
            // remaining > 0 but this batch hit the 5-leg cap: loop again for the overflow split.
        }

        Ok(MatchOutcome {
            taker_order_hash: taker_hash,
            filled_amount: total_filled,
            fills: all_fills,
            match_jobs: all_jobs,
        })
    }
}

fn crosses(taker_side: crate::model::Side, taker_price: u64, maker_price: u64) -> bool {
    use crate::model::Side;
    match taker_side {
        Side::Buy => taker_price >= maker_price,
        Side::Sell => taker_price <= maker_price,
    }
}

fn fill_fields(fill: &FillEvent) -> Vec<(String, String)> {
    vec![
        ("taker_order_hash".into(), crate::model::order::encode_base58(&fill.taker_order_hash)),
        ("maker_order_hash".into(), crate::model::order::encode_base58(&fill.maker_order_hash)),
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

fn job_fields(job: &MatchJob) -> Result<Vec<(String, String)>, MatchError> {
    Ok(vec![
        ("taker_order_hash".into(), crate::model::order::encode_base58(&job.taker_order_hash)),
        ("taker_fill_amount".into(), job.taker_fill_amount.to_string()),
        (
            "maker_order_hashes".into(),
            job.maker_order_hashes
                .iter()
                .map(|h| crate::model::order::encode_base58(h))
                .collect::<Vec<_>>()
                .join(","),
        ),
        (
            "maker_fill_amounts".into(),
            job.maker_fill_amounts
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(","),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Side;

    #[test]
    fn buy_crosses_lower_or_equal_ask() {
        assert!(crosses(Side::Buy, 500_000, 500_000));
        assert!(crosses(Side::Buy, 600_000, 500_000));
        assert!(!crosses(Side::Buy, 400_000, 500_000));
    }

    #[test]
    fn sell_crosses_higher_or_equal_bid() {
        assert!(crosses(Side::Sell, 500_000, 500_000));
        assert!(crosses(Side::Sell, 400_000, 500_000));
        assert!(!crosses(Side::Sell, 600_000, 500_000));
    }
}
