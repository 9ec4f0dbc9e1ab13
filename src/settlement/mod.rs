pub mod onchain;
pub mod worker;

pub use onchain::{OnchainError, OnchainSettlementClient, SettlementReceipt, SolanaSettlementClient};
pub use worker::{SettlementWorker, SettlementWorkerConfig};
