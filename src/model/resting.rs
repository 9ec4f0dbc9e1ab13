use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::order::{OrderHash, SignedOrder};

/// Lifecycle state of a resting order record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    Partial,
    Matched,
    Settled,
    Failed,
    Cancelled,
}

/// The record held by the orderbook store for every accepted order.
///
/// Invariant: `filled_amount + remaining_amount == signed_order.order.maker_amount`.
#[derive(Debug, Clone)]
pub struct RestingOrder {
    pub order_hash: OrderHash,
    pub signed_order: SignedOrder,
    pub status: OrderStatus,
    pub filled_amount: u64,
    pub remaining_amount: u64,
    pub created_at: DateTime<Utc>,
}

impl RestingOrder {
    pub fn new(signed_order: SignedOrder, now: DateTime<Utc>) -> Self {
        let order_hash = signed_order.order_hash();
        let maker_amount = signed_order.order.maker_amount;
        Self {
            order_hash,
            signed_order,
            status: OrderStatus::Open,
            filled_amount: 0,
            remaining_amount: maker_amount,
            created_at: now,
        }
    }

    /// Applies a fill of `amount`, transitioning `open -> partial -> matched`.
    ///
    /// Returns `None` if `amount` exceeds `remaining_amount` (caller must CAS against the
    /// authoritative store value before calling this on a shared record).
    pub fn apply_fill(&mut self, amount: u64) -> Option<OrderStatus> {
        if amount > self.remaining_amount {
            return None;
        }
        self.filled_amount += amount;
        self.remaining_amount -= amount;
        self.status = if self.remaining_amount == 0 {
            OrderStatus::Matched
        } else {
            OrderStatus::Partial
        };
        Some(self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::order::{Order, Side, TokenId};
    use solana_sdk::pubkey::Pubkey;

    fn signed(maker_amount: u64) -> SignedOrder {
        SignedOrder {
            order: Order {
                salt: 1,
                maker: Pubkey::default(),
                signer: Pubkey::default(),
                taker: Pubkey::default(),
                market: Pubkey::default(),
                token_id: TokenId::Yes,
                maker_amount,
                taker_amount: maker_amount,
                expiration: 0,
                nonce: 0,
                fee_rate_bps: 0,
                side: Side::Buy,
            },
            signature: [0u8; 64],
        }
    }

    #[test]
    fn fill_invariant_holds() {
        let mut resting = RestingOrder::new(signed(100), Utc::now());
        resting.apply_fill(40).unwrap();
        assert_eq!(resting.status, OrderStatus::Partial);
        assert_eq!(resting.filled_amount + resting.remaining_amount, 100);
        resting.apply_fill(60).unwrap();
        assert_eq!(resting.status, OrderStatus::Matched);
        assert_eq!(resting.remaining_amount, 0);
    }

    #[test]
    fn overfill_rejected() {
        let mut resting = RestingOrder::new(signed(100), Utc::now());
        assert!(resting.apply_fill(150).is_none());
        assert_eq!(resting.remaining_amount, 100);
    }
}
