use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::model::OrderHash;
use crate::settlement::onchain::order_status_pda;

/// Seed prefix for a maker's on-chain nonce account.
pub const NONCE_SEED: &[u8] = b"nonce";

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("rpc error: {0}")]
    Rpc(#[from] solana_client::client_error::ClientError),
    #[error("malformed on-chain account data: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy)]
pub struct OrderOnchainStatus {
    pub is_filled_or_cancelled: bool,
    pub remaining: u64,
}

/// Read-only oracle over on-chain order/nonce state (C7). Called by intake (nonce check), the
/// public status endpoint, and the settlement worker on retry to detect a success that merely
/// reported as a timeout.
#[async_trait]
pub trait OrderStatusOracle: Send + Sync {
    async fn nonce_of(&self, maker: Pubkey) -> Result<u64, OracleError>;
    async fn status_of(&self, order_hash: OrderHash) -> Result<Option<OrderOnchainStatus>, OracleError>;
}

pub struct SolanaOrderStatusOracle {
    rpc: RpcClient,
    program_id: Pubkey,
}

impl SolanaOrderStatusOracle {
    pub fn new(rpc_url: &str, program_id: Pubkey) -> Self {
        Self {
            rpc: RpcClient::new(rpc_url.to_string()),
            program_id,
        }
    }

    /// Decodes the order-status account: discriminator (8B) ‖ hash (32B) ‖ flag (1B) ‖
    /// remaining (8B LE) ‖ bump (1B).
    fn decode_status(data: &[u8]) -> Result<OrderOnchainStatus, OracleError> {
        const DISCRIMINATOR: usize = 8;
        const HASH: usize = 32;
        const FLAG: usize = 1;
        const REMAINING: usize = 8;
        let expected = DISCRIMINATOR + HASH + FLAG + REMAINING + 1;
        if data.len() != expected {
            return Err(OracleError::Malformed(format!("expected {expected} bytes, got {}", data.len())));
        }
        let flag_off = DISCRIMINATOR + HASH;
        let remaining_off = flag_off + FLAG;
        let is_filled_or_cancelled = data[flag_off] != 0;
        let remaining = u64::from_le_bytes(data[remaining_off..remaining_off + REMAINING].try_into().unwrap());
        Ok(OrderOnchainStatus { is_filled_or_cancelled, remaining })
    }
}

#[async_trait]
impl OrderStatusOracle for SolanaOrderStatusOracle {
    async fn nonce_of(&self, maker: Pubkey) -> Result<u64, OracleError> {
        let (nonce_account, _) = Pubkey::find_program_address(&[NONCE_SEED, maker.as_ref()], &self.program_id);
        match self.rpc.get_account(&nonce_account).await {
            Ok(account) => {
                if account.data.len() < 8 {
                    return Err(OracleError::Malformed("nonce account too short".into()));
                }
                Ok(u64::from_le_bytes(account.data[0..8].try_into().unwrap()))
            }
            Err(_) => Ok(0), // absent nonce account means the maker has never transacted
        }
    }

    async fn status_of(&self, order_hash: OrderHash) -> Result<Option<OrderOnchainStatus>, OracleError> {
        let (status_account, _) = order_status_pda(&self.program_id, &order_hash);
        match self.rpc.get_account(&status_account).await {
            Ok(account) => Self::decode_status(&account.data).map(Some),
            Err(_) => Ok(None),
        }
    }
}
