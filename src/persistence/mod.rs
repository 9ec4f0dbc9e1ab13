pub mod cache;
pub mod ledger;
pub mod snapshot;
pub mod worker;

pub use cache::MarketTitleCache;
pub use ledger::{Ledger, LedgerError};
pub use snapshot::BalanceSnapshotter;
pub use worker::{PersistenceWorker, PersistenceWorkerConfig};

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

/// Hook for C6's "emit a trade notification" step. The notification domain itself (templates,
/// storage, delivery receipts) is out of scope for this core; this trait only lets the
/// persistence worker hand a trade event to whatever fans it out (C8). `market_title` is a
/// best-effort lookup through `MarketTitleCache` — `None` when the cache/ledger has no title on
/// file, never a reason to drop the notification.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify_trade(&self, owner: Pubkey, market: Pubkey, market_title: Option<&str>, price: u64, size: u64);
}

/// Drops trade notifications. Used where no real-time fanout is wired up (tests, the
/// settlement worker binary, which has no websocket surface).
pub struct NullNotificationSink;

#[async_trait]
impl NotificationSink for NullNotificationSink {
    async fn notify_trade(&self, _owner: Pubkey, _market: Pubkey, _market_title: Option<&str>, _price: u64, _size: u64) {}
}
