use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub cache: CacheConfig,
    pub ledger: LedgerConfig,
    pub solana: SolanaConfig,
    pub http: HttpConfig,
    pub settlement: SettlementConfig,
    pub persistence: PersistenceConfig,
    pub fanout: FanoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub redis_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub database_url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolanaConfig {
    pub rpc_url: String,
    pub settlement_program_id: String,
    pub operator_keypair_path: String,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    pub consumer_name: String,
    pub submit_timeout_secs: u64,
    pub base_backoff_secs: u64,
    pub max_attempts: u32,
    pub idle_reclaim_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub consumer_name: String,
    pub batch_size: usize,
    pub block_ms: u64,
    pub idle_reclaim_ms: u64,
    pub snapshot_every_n_iterations: u64,
    pub market_title_cache_capacity: u64,
    pub market_title_cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    pub max_connections: usize,
    pub max_connections_per_ip: usize,
    pub max_subscriptions_per_connection: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig {
                redis_url: "redis://127.0.0.1:6379".into(),
            },
            ledger: LedgerConfig {
                database_url: "postgres://localhost/catallaxyz".into(),
                max_connections: 10,
            },
            solana: SolanaConfig {
                rpc_url: "https://api.mainnet-beta.solana.com".into(),
                settlement_program_id: String::new(),
                operator_keypair_path: String::new(),
                connect_timeout_secs: 5,
            },
            http: HttpConfig {
                bind_addr: "0.0.0.0:8080".into(),
            },
            settlement: SettlementConfig {
                consumer_name: "settlement-1".into(),
                submit_timeout_secs: 60,
                base_backoff_secs: 2,
                max_attempts: 3,
                idle_reclaim_ms: 60_000,
            },
            persistence: PersistenceConfig {
                consumer_name: "persistence-1".into(),
                batch_size: 100,
                block_ms: 5_000,
                idle_reclaim_ms: 60_000,
                snapshot_every_n_iterations: 60,
                market_title_cache_capacity: 1_000,
                market_title_cache_ttl_secs: 3_600,
            },
            fanout: FanoutConfig {
                max_connections: 10_000,
                max_connections_per_ip: 50,
                max_subscriptions_per_connection: 20,
            },
        }
    }
}

impl Config {
    /// Loads configuration from environment variables (`.env` file honored), falling back to
    /// defaults for anything unset.
    ///
    /// Recognized env vars: `REDIS_URL`, `DATABASE_URL`, `DATABASE_MAX_CONNECTIONS`,
    /// `SOLANA_RPC_URL`, `SETTLEMENT_PROGRAM_ID`, `OPERATOR_KEYPAIR_PATH`, `HTTP_BIND_ADDR`,
    /// `SETTLEMENT_CONSUMER_NAME`, `PERSISTENCE_CONSUMER_NAME`, `RUST_LOG`.
    pub fn load() -> Self {
        let _ = dotenv::dotenv();

        let mut config = Self::default();

        if let Ok(v) = std::env::var("REDIS_URL") {
            config.cache.redis_url = v;
        }
        if let Ok(v) = std::env::var("DATABASE_URL") {
            config.ledger.database_url = v;
        }
        if let Ok(v) = std::env::var("DATABASE_MAX_CONNECTIONS") {
            config.ledger.max_connections = v.parse().unwrap_or(config.ledger.max_connections);
        }
        if let Ok(v) = std::env::var("SOLANA_RPC_URL") {
            config.solana.rpc_url = v;
        }
        if let Ok(v) = std::env::var("SETTLEMENT_PROGRAM_ID") {
            config.solana.settlement_program_id = v;
        }
        if let Ok(v) = std::env::var("OPERATOR_KEYPAIR_PATH") {
            config.solana.operator_keypair_path = v;
        }
        if let Ok(v) = std::env::var("HTTP_BIND_ADDR") {
            config.http.bind_addr = v;
        }
        if let Ok(v) = std::env::var("SETTLEMENT_CONSUMER_NAME") {
            config.settlement.consumer_name = v;
        }
        if let Ok(v) = std::env::var("PERSISTENCE_CONSUMER_NAME") {
            config.persistence.consumer_name = v;
        }

        config
    }

    /// Surfaces missing/invalid configuration without panicking. Workers call this at startup
    /// and exit with code 1 on failure (§6 exit codes).
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.cache.redis_url.is_empty(), "cache.redis_url must be set");
        anyhow::ensure!(!self.ledger.database_url.is_empty(), "ledger.database_url must be set");
        anyhow::ensure!(self.ledger.max_connections > 0, "ledger.max_connections must be positive");
        anyhow::ensure!(!self.solana.rpc_url.is_empty(), "solana.rpc_url must be set");
        anyhow::ensure!(
            self.settlement.max_attempts > 0,
            "settlement.max_attempts must be positive"
        );
        anyhow::ensure!(
            self.persistence.batch_size > 0,
            "persistence.batch_size must be positive"
        );
        Ok(())
    }
}
