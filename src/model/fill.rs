use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use super::order::{OrderHash, Side, TokenId};

/// One leg of a match, published to `stream:fills`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillEvent {
    pub taker_order_hash: OrderHash,
    pub maker_order_hash: OrderHash,
    pub taker_owner: Pubkey,
    pub maker_owner: Pubkey,
    pub market: Pubkey,
    pub token_id: TokenId,
    pub side: Side,
    pub price: u64,
    pub size: u64,
    pub timestamp_ms: i64,
}

/// A bundle of one taker leg and 1..=5 maker legs submitted atomically to the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchJob {
    pub taker_order_hash: OrderHash,
    pub taker_fill_amount: u64,
    pub maker_order_hashes: Vec<OrderHash>,
    pub maker_fill_amounts: Vec<u64>,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MatchJobError {
    #[error("maker leg count {0} exceeds the batch bound of {1}")]
    TooManyLegs(usize, usize),
    #[error("maker_order_hashes and maker_fill_amounts have different lengths")]
    LengthMismatch,
    #[error("sum of maker fill amounts ({0}) does not equal taker fill amount ({1})")]
    SumMismatch(u64, u64),
    #[error("a match job must carry at least one maker leg")]
    Empty,
}

impl MatchJob {
    pub const MAX_LEGS: usize = super::order::MAX_MATCH_LEGS;

    pub fn new(
        taker_order_hash: OrderHash,
        taker_fill_amount: u64,
        maker_order_hashes: Vec<OrderHash>,
        maker_fill_amounts: Vec<u64>,
    ) -> Result<Self, MatchJobError> {
        if maker_order_hashes.is_empty() {
            return Err(MatchJobError::Empty);
        }
        if maker_order_hashes.len() != maker_fill_amounts.len() {
            return Err(MatchJobError::LengthMismatch);
        }
        if maker_order_hashes.len() > Self::MAX_LEGS {
            return Err(MatchJobError::TooManyLegs(maker_order_hashes.len(), Self::MAX_LEGS));
        }
        let sum: u64 = maker_fill_amounts.iter().sum();
        if sum != taker_fill_amount {
            return Err(MatchJobError::SumMismatch(sum, taker_fill_amount));
        }
        Ok(Self {
            taker_order_hash,
            taker_fill_amount,
            maker_order_hashes,
            maker_fill_amounts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_oversized_batch() {
        let hashes = vec![[0u8; 32]; 6];
        let amounts = vec![1u64; 6];
        let err = MatchJob::new([1u8; 32], 6, hashes, amounts).unwrap_err();
        assert_eq!(err, MatchJobError::TooManyLegs(6, 5));
    }

    #[test]
    fn accepts_exactly_five_legs() {
        let hashes = vec![[0u8; 32]; 5];
        let amounts = vec![2u64; 5];
        let job = MatchJob::new([1u8; 32], 10, hashes, amounts).unwrap();
        assert_eq!(job.maker_order_hashes.len(), 5);
    }

    #[test]
    fn rejects_sum_mismatch() {
        let err = MatchJob::new([1u8; 32], 10, vec![[0u8; 32]], vec![5]).unwrap_err();
        assert_eq!(err, MatchJobError::SumMismatch(5, 10));
    }
}
