use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub const DEFAULT_MAX_CONNECTIONS: usize = 10_000;
pub const DEFAULT_MAX_CONNECTIONS_PER_IP: usize = 50;
pub const DEFAULT_MAX_SUBSCRIPTIONS_PER_CONNECTION: usize = 20;
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerFrame {
    Connected { timestamp: i64 },
    Subscribed { channel: String, timestamp: i64 },
    Unsubscribed { channel: String, timestamp: i64 },
    Pong { timestamp: i64 },
    Snapshot { channel: String, data: serde_json::Value, timestamp: i64 },
    Orderbook { channel: String, data: serde_json::Value, timestamp: i64 },
    Trade { channel: String, data: serde_json::Value, timestamp: i64 },
    Price { channel: String, data: serde_json::Value, timestamp: i64 },
    Order { channel: String, data: serde_json::Value, timestamp: i64 },
    Balance { channel: String, data: serde_json::Value, timestamp: i64 },
    Fill { channel: String, data: serde_json::Value, timestamp: i64 },
    Notification { channel: String, data: serde_json::Value, timestamp: i64 },
    Error { data: serde_json::Value, timestamp: i64 },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAction {
    Subscribe,
    Unsubscribe,
    Ping,
}

#[derive(Debug, Deserialize)]
pub struct ChannelAuth {
    pub key: String,
    pub passphrase: String,
    pub signature: String,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    pub action: ClientAction,
    pub channel: Option<String>,
    pub auth: Option<ChannelAuth>,
}

/// Connection/subscription limit violation kinds, mapped to an explanatory close frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitError {
    TooManyConnections,
    TooManyConnectionsForIp,
    TooManySubscriptions,
}

/// Channel multiplexer (C8): one `tokio::sync::broadcast` per named channel, lazily created.
/// Connections subscribe by name; a best-effort send means a lagging or closed socket is
/// simply dropped on its next publish rather than blocking the publisher.
pub struct Fanout {
    channels: DashMap<String, broadcast::Sender<ServerFrame>>,
    total_connections: AtomicUsize,
    connections_per_ip: DashMap<IpAddr, usize>,
    max_connections: usize,
    max_connections_per_ip: usize,
    max_subscriptions_per_connection: usize,
}

impl Fanout {
    pub fn new(max_connections: usize, max_connections_per_ip: usize, max_subscriptions_per_connection: usize) -> Self {
        Self {
            channels: DashMap::new(),
            total_connections: AtomicUsize::new(0),
            connections_per_ip: DashMap::new(),
            max_connections,
            max_connections_per_ip,
            max_subscriptions_per_connection,
        }
    }

    pub fn max_subscriptions_per_connection(&self) -> usize {
        self.max_subscriptions_per_connection
    }

    /// Registers a new connection, enforcing the per-process and per-IP caps.
    pub fn register_connection(&self, ip: IpAddr) -> Result<(), LimitError> {
        if self.total_connections.load(Ordering::Relaxed) >= self.max_connections {
            return Err(LimitError::TooManyConnections);
        }
        let mut entry = self.connections_per_ip.entry(ip).or_insert(0);
        if *entry >= self.max_connections_per_ip {
            return Err(LimitError::TooManyConnectionsForIp);
        }
        *entry += 1;
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn deregister_connection(&self, ip: IpAddr) {
        self.total_connections.fetch_sub(1, Ordering::Relaxed);
        if let Some(mut entry) = self.connections_per_ip.get_mut(&ip) {
            *entry = entry.saturating_sub(1);
        }
    }

    /// Subscribes to `channel`, creating its broadcast bus on first use.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<ServerFrame> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publishes to `channel`. A channel with no current subscribers is a silent no-op.
    pub fn publish(&self, channel: &str, frame: ServerFrame) {
        if let Some(sender) = self.channels.get(channel) {
            let _ = sender.send(frame); // best-effort: lagging/closed receivers are dropped
        }
    }
}

pub fn is_user_channel(channel: &str) -> Option<&str> {
    channel.strip_prefix("user:")
}

pub fn is_market_channel(channel: &str) -> bool {
    channel.starts_with("market:")
}

#[async_trait::async_trait]
impl crate::persistence::NotificationSink for Fanout {
    async fn notify_trade(
        &self,
        owner: solana_sdk::pubkey::Pubkey,
        market: solana_sdk::pubkey::Pubkey,
        market_title: Option<&str>,
        price: u64,
        size: u64,
    ) {
        let timestamp = chrono::Utc::now().timestamp_millis();
        self.publish(
            &format!("user:{owner}"),
            ServerFrame::Notification {
                channel: format!("user:{owner}"),
                data: serde_json::json!({
                    "kind": "trade",
                    "market": market.to_string(),
                    "marketTitle": market_title,
                    "price": price,
                    "size": size,
                }),
                timestamp,
            },
        );
    }
}
