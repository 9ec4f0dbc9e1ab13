//! End-to-end matching scenarios run against in-memory store/stream fakes rather than a live
//! cache, so this suite covers C3's book-walk semantics without needing Redis.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use solana_sdk::pubkey::Pubkey;

use catallaxyz_core::matching::MatchingEngine;
use catallaxyz_core::model::order::{Order, Side, SignedOrder, TokenId};
use catallaxyz_core::model::{OrderHash, OrderStatus, RestingOrder};
use catallaxyz_core::store::{BookLevel, OrderbookStore, StoreError};
use catallaxyz_core::streams::{EventStream, StreamError, StreamMessage};

#[derive(Default)]
struct MockStore {
    records: Mutex<HashMap<OrderHash, RestingOrder>>,
    insertion_order: Mutex<Vec<OrderHash>>,
}

#[async_trait]
impl OrderbookStore for MockStore {
    async fn insert(&self, signed_order: SignedOrder) -> Result<RestingOrder, StoreError> {
        let hash = signed_order.order_hash();
        let mut records = self.records.lock().unwrap();
        if let Some(existing) = records.get(&hash) {
            return Ok(existing.clone());
        }
        let resting = RestingOrder::new(signed_order, Utc::now());
        records.insert(hash, resting.clone());
        self.insertion_order.lock().unwrap().push(hash);
        Ok(resting)
    }

    async fn best_n(
        &self,
        market: Pubkey,
        token: TokenId,
        side: Side,
        n: usize,
    ) -> Result<Vec<BookLevel>, StoreError> {
        let records = self.records.lock().unwrap();
        let order_index = self.insertion_order.lock().unwrap();
        let mut levels: Vec<(usize, BookLevel)> = records
            .values()
            .filter(|r| {
                r.remaining_amount > 0
                    && r.signed_order.order.market == market
                    && r.signed_order.order.token_id == token
                    && r.signed_order.order.side == side
            })
            .map(|r| {
                let idx = order_index.iter().position(|h| *h == r.order_hash).unwrap_or(usize::MAX);
                (
                    idx,
                    BookLevel {
                        order_hash: r.order_hash,
                        price: r.signed_order.order.price(),
                        remaining: r.remaining_amount,
                        owner: r.signed_order.order.maker,
                    },
                )
            })
            .collect();

        levels.sort_by(|a, b| match side {
            Side::Buy => b.1.price.cmp(&a.1.price).then(a.0.cmp(&b.0)),
            Side::Sell => a.1.price.cmp(&b.1.price).then(a.0.cmp(&b.0)),
        });
        Ok(levels.into_iter().take(n).map(|(_, l)| l).collect())
    }

    async fn decrement(&self, order_hash: OrderHash, delta: u64) -> Result<(u64, OrderStatus), StoreError> {
        let mut records = self.records.lock().unwrap();
        let record = records.get_mut(&order_hash).ok_or_else(|| StoreError::NotFound("order".into()))?;
        if delta > record.remaining_amount {
            return Err(StoreError::InsufficientRemaining { delta, remaining: record.remaining_amount });
        }
        let status = record.apply_fill(delta).expect("checked above");
        Ok((record.remaining_amount, status))
    }

    async fn remove(&self, order_hash: OrderHash, mark_cancelled: bool) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        if mark_cancelled {
            if let Some(record) = records.get_mut(&order_hash) {
                record.status = OrderStatus::Cancelled;
            }
        } else {
            records.remove(&order_hash);
        }
        Ok(())
    }

    async fn get(&self, order_hash: OrderHash) -> Result<Option<RestingOrder>, StoreError> {
        Ok(self.records.lock().unwrap().get(&order_hash).cloned())
    }

    async fn set_status(&self, order_hash: OrderHash, status: OrderStatus) -> Result<(), StoreError> {
        if let Some(record) = self.records.lock().unwrap().get_mut(&order_hash) {
            record.status = status;
        }
        Ok(())
    }

    async fn user_orders(&self, maker: Pubkey) -> Result<Vec<OrderHash>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.signed_order.order.maker == maker)
            .map(|r| r.order_hash)
            .collect())
    }
}

#[derive(Default)]
struct MockStream {
    appended: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

#[async_trait]
impl EventStream for MockStream {
    async fn ensure_group(&self, _stream: &str, _group: &str) -> Result<(), StreamError> {
        Ok(())
    }

    async fn append(&self, stream: &str, fields: &[(String, String)]) -> Result<String, StreamError> {
        let mut appended = self.appended.lock().unwrap();
        appended.push((stream.to_string(), fields.to_vec()));
        Ok(format!("{}-0", appended.len()))
    }

    async fn read_group(
        &self,
        _stream: &str,
        _group: &str,
        _consumer: &str,
        _count: usize,
        _block_ms: u64,
    ) -> Result<Vec<StreamMessage>, StreamError> {
        Ok(Vec::new())
    }

    async fn claim_pending(
        &self,
        _stream: &str,
        _group: &str,
        _consumer: &str,
        _idle_ms: u64,
        _count: usize,
    ) -> Result<Vec<StreamMessage>, StreamError> {
        Ok(Vec::new())
    }

    async fn ack(&self, _stream: &str, _group: &str, _id: &str) -> Result<(), StreamError> {
        Ok(())
    }
}

impl MockStream {
    fn count_on(&self, stream: &str) -> usize {
        self.appended.lock().unwrap().iter().filter(|(s, _)| s == stream).count()
    }
}

fn pk(seed: u8) -> Pubkey {
    let mut bytes = [0u8; 32];
    bytes[0] = seed;
    Pubkey::from(bytes)
}

/// A resting order priced so `maker_amount / taker_amount` hits the given price, in
/// `PRICE_SCALE` units, for a specific side.
fn order(owner: u8, side: Side, maker_amount: u64, taker_amount: u64, salt: u64) -> SignedOrder {
    SignedOrder {
        order: Order {
            salt,
            maker: pk(owner),
            signer: pk(owner),
            taker: Pubkey::default(),
            market: pk(100),
            token_id: TokenId::Yes,
            maker_amount,
            taker_amount,
            expiration: 0,
            nonce: 0,
            fee_rate_bps: 0,
            side,
        },
        signature: [0u8; 64],
    }
}

async fn engine() -> (MatchingEngine<MockStore, MockStream>, Arc<MockStore>, Arc<MockStream>) {
    let store = Arc::new(MockStore::default());
    let stream = Arc::new(MockStream::default());
    let engine = MatchingEngine::new(store.clone(), stream.clone());
    (engine, store, stream)
}

#[tokio::test]
async fn clean_cross_fully_fills_both_sides() {
    let (engine, store, stream) = engine().await;

    let maker = order(1, Side::Sell, 1_000_000, 500_000, 1); // asks at price 500_000
    store.insert(maker).await.unwrap();

    let taker = order(2, Side::Buy, 500_000, 1_000_000, 2); // bids at price 500_000
    let taker_hash = taker.order_hash();
    store.insert(taker).await.unwrap();

    let outcome = engine.try_match(taker).await.unwrap();

    assert_eq!(outcome.filled_amount, 500_000);
    assert_eq!(outcome.fills.len(), 1);
    assert_eq!(outcome.match_jobs.len(), 1);

    let taker_record = store.get(taker_hash).await.unwrap().unwrap();
    assert_eq!(taker_record.remaining_amount, 0);
    assert_eq!(taker_record.status, OrderStatus::Matched);
    assert_eq!(stream.count_on(catallaxyz_core::streams::STREAM_FILLS), 1);
    assert_eq!(stream.count_on(catallaxyz_core::streams::STREAM_MATCH_JOBS), 1);
}

#[tokio::test]
async fn partial_cross_leaves_taker_resting() {
    let (engine, store, _stream) = engine().await;

    let maker = order(1, Side::Sell, 300_000, 150_000, 1); // ask at 500_000, only 300_000 deep
    store.insert(maker).await.unwrap();

    let taker = order(2, Side::Buy, 500_000, 1_000_000, 2); // wants 500_000
    let taker_hash = taker.order_hash();
    store.insert(taker).await.unwrap();

    let outcome = engine.try_match(taker).await.unwrap();

    assert_eq!(outcome.filled_amount, 300_000);
    let taker_record = store.get(taker_hash).await.unwrap().unwrap();
    assert_eq!(taker_record.remaining_amount, 200_000);
    assert_eq!(taker_record.status, OrderStatus::Partial);
}

#[tokio::test]
async fn multi_maker_batch_fills_from_several_resting_orders() {
    let (engine, store, _stream) = engine().await;

    for (owner, salt) in [(1u8, 1u64), (2, 2), (3, 3)] {
        let maker = order(owner, Side::Sell, 200_000, 100_000, salt); // each asks 200_000 at 500_000
        store.insert(maker).await.unwrap();
    }

    let taker = order(9, Side::Buy, 500_000, 1_000_000, 10); // needs all three makers
    store.insert(taker).await.unwrap();

    let outcome = engine.try_match(taker).await.unwrap();

    assert_eq!(outcome.filled_amount, 500_000);
    assert_eq!(outcome.fills.len(), 3);
    assert_eq!(outcome.match_jobs.len(), 1);
    assert_eq!(outcome.match_jobs[0].maker_order_hashes.len(), 3);
}

#[tokio::test]
async fn overflow_beyond_five_legs_splits_into_two_jobs() {
    let (engine, store, _stream) = engine().await;

    for (owner, salt) in (1u8..=7).zip(1u64..=7) {
        let maker = order(owner, Side::Sell, 100_000, 50_000, salt); // 7 makers, 100_000 each
        store.insert(maker).await.unwrap();
    }

    let taker = order(50, Side::Buy, 700_000, 1_400_000, 99);
    store.insert(taker).await.unwrap();

    let outcome = engine.try_match(taker).await.unwrap();

    assert_eq!(outcome.filled_amount, 700_000);
    assert_eq!(outcome.match_jobs.len(), 2);
    assert_eq!(outcome.match_jobs[0].maker_order_hashes.len(), 5);
    assert_eq!(outcome.match_jobs[1].maker_order_hashes.len(), 2);
}

#[tokio::test]
async fn self_trade_is_skipped_in_favor_of_next_candidate() {
    let (engine, store, _stream) = engine().await;

    let taker = order(7, Side::Buy, 500_000, 1_000_000, 1);
    let taker_hash = taker.order_hash();
    store.insert(taker).await.unwrap();

    let own_resting_ask = order(7, Side::Sell, 500_000, 250_000, 2); // same owner as taker, same price
    store.insert(own_resting_ask).await.unwrap();

    let other_ask = order(8, Side::Sell, 250_000, 125_000, 3); // different owner, same price, 250_000 deep
    store.insert(other_ask).await.unwrap();

    let outcome = engine.try_match(taker).await.unwrap();

    assert_eq!(outcome.fills.len(), 1);
    assert_eq!(outcome.fills[0].maker_owner, pk(8));

    let taker_record = store.get(taker_hash).await.unwrap().unwrap();
    assert_eq!(taker_record.remaining_amount, 500_000 - 250_000);
}

#[tokio::test]
async fn expired_taker_order_is_rejected_before_it_ever_reaches_the_book() {
    let taker = order(2, Side::Buy, 500_000, 1_000_000, 2);
    let expired = SignedOrder {
        order: Order { expiration: 1_700_000_000, ..taker.order },
        ..taker
    };

    assert!(expired.order.validate().is_ok());
    assert!(expired.order.is_expired(1_700_000_001));

    // Intake (`submit_order`) checks `is_expired` before ever inserting into the store or
    // calling `try_match`, so an expired order never crosses the book at all.
}
