use std::time::Duration;

use moka::future::Cache;
use solana_sdk::pubkey::Pubkey;

use super::ledger::{Ledger, LedgerError};

/// Bounded LRU with per-entry TTL in front of `markets.title`, to avoid stampeding the ledger
/// when a burst of fills for the same market needs a title for notification text.
pub struct MarketTitleCache {
    inner: Cache<Pubkey, String>,
}

impl MarketTitleCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder().max_capacity(capacity).time_to_live(ttl).build(),
        }
    }

    pub async fn get_or_fetch(&self, ledger: &Ledger, market: Pubkey) -> Result<Option<String>, LedgerError> {
        if let Some(title) = self.inner.get(&market).await {
            return Ok(Some(title));
        }
        let title = ledger.market_title(market).await?;
        if let Some(ref t) = title {
            self.inner.insert(market, t.clone()).await;
        }
        Ok(title)
    }
}
