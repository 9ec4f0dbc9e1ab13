use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::task::JoinHandle;
use tracing::warn;

use super::fanout::{is_market_channel, is_user_channel, ChannelAuth, ClientAction, ClientFrame, Fanout, LimitError, ServerFrame};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a channel-auth timestamp before it's rejected as stale.
const AUTH_SKEW_SECS: i64 = 30;

/// Verifies an HMAC credential against the server's per-wallet secret. The credential itself
/// (key/passphrase/signature/timestamp) is issued at login, which is outside this core's
/// scope — this is only the binding check the fanout performs on each subscribe.
pub fn verify_channel_auth(secret: &[u8], auth: &ChannelAuth, now: chrono::DateTime<Utc>) -> bool {
    let Ok(ts) = auth.timestamp.parse::<i64>() else { return false };
    if (now.timestamp() - ts).abs() > AUTH_SKEW_SECS {
        return false;
    }
    let payload = format!("{}{}{}", auth.key, auth.passphrase, auth.timestamp);
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else { return false };
    mac.update(payload.as_bytes());
    let expected = mac.finalize().into_bytes();
    let Ok(given) = hex::decode(&auth.signature) else { return false };
    given.len() == expected.len() && given.iter().zip(expected.iter()).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

/// Per-wallet secret lookup, kept abstract so the websocket layer doesn't own credential storage.
pub trait ChannelSecretStore: Send + Sync {
    fn secret_for(&self, wallet: &str) -> Option<Vec<u8>>;
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<WsState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, addr, state))
}

pub struct WsState {
    pub fanout: Arc<Fanout>,
    pub secrets: Arc<dyn ChannelSecretStore>,
}

async fn handle_socket(mut socket: WebSocket, addr: SocketAddr, state: Arc<WsState>) {
    if let Err(limit) = state.fanout.register_connection(addr.ip()) {
        let reason = match limit {
            LimitError::TooManyConnections => "max connections reached",
            LimitError::TooManyConnectionsForIp => "max connections per IP reached",
            LimitError::TooManySubscriptions => "max subscriptions reached",
        };
        let _ = socket
            .send(Message::Text(
                serde_json::to_string(&ServerFrame::Error {
                    data: serde_json::json!({ "reason": reason }),
                    timestamp: Utc::now().timestamp_millis(),
                })
                .unwrap_or_default()
                .into(),
            ))
            .await;
        let _ = socket.close().await;
        return;
    }

    let (out_tx, mut out_rx) = tokio::sync::mpsc::channel::<ServerFrame>(256);
    let _ = out_tx
        .send(ServerFrame::Connected { timestamp: Utc::now().timestamp_millis() })
        .await;

    let mut bound_wallet: Option<String> = None;
    let mut forwarders: HashMap<String, JoinHandle<()>> = HashMap::new();

    loop {
        tokio::select! {
            outgoing = out_rx.recv() => {
                match outgoing {
                    Some(frame) => {
                        if let Ok(text) = serde_json::to_string(&frame) {
                            if socket.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    None => break,
                }
            }
            incoming = socket.recv() => {
                let Some(Ok(msg)) = incoming else { break };
                let Message::Text(text) = msg else { continue };
                let Ok(frame) = serde_json::from_str::<ClientFrame>(&text) else {
                    let _ = out_tx.send(ServerFrame::Error {
                        data: serde_json::json!({ "reason": "malformed frame" }),
                        timestamp: Utc::now().timestamp_millis(),
                    }).await;
                    continue;
                };

                match frame.action {
                    ClientAction::Ping => {
                        let _ = out_tx.send(ServerFrame::Pong { timestamp: Utc::now().timestamp_millis() }).await;
                    }
                    ClientAction::Subscribe => {
                        let Some(channel) = frame.channel else { continue };
                        if forwarders.len() >= state.fanout.max_subscriptions_per_connection() {
                            let _ = out_tx.send(ServerFrame::Error {
                                data: serde_json::json!({ "reason": "max subscriptions per connection reached" }),
                                timestamp: Utc::now().timestamp_millis(),
                            }).await;
                            continue;
                        }

                        if let Some(wallet) = is_user_channel(&channel) {
                            if !authorize_user_channel(&state, wallet, frame.auth.as_ref(), &mut bound_wallet) {
                                let _ = out_tx.send(ServerFrame::Error {
                                    data: serde_json::json!({ "reason": "unauthorized" }),
                                    timestamp: Utc::now().timestamp_millis(),
                                }).await;
                                continue;
                            }
                        } else if !is_market_channel(&channel) {
                            let _ = out_tx.send(ServerFrame::Error {
                                data: serde_json::json!({ "reason": "unknown channel namespace" }),
                                timestamp: Utc::now().timestamp_millis(),
                            }).await;
                            continue;
                        }

                        let mut rx = state.fanout.subscribe(&channel);
                        let forward_tx = out_tx.clone();
                        let handle = tokio::spawn(async move {
                            while let Ok(frame) = rx.recv().await {
                                if forward_tx.send(frame).await.is_err() {
                                    break;
                                }
                            }
                        });
                        forwarders.insert(channel.clone(), handle);
                        let _ = out_tx.send(ServerFrame::Subscribed {
                            channel,
                            timestamp: Utc::now().timestamp_millis(),
                        }).await;
                    }
                    ClientAction::Unsubscribe => {
                        let Some(channel) = frame.channel else { continue };
                        if let Some(handle) = forwarders.remove(&channel) {
                            handle.abort();
                        }
                        let _ = out_tx.send(ServerFrame::Unsubscribed {
                            channel,
                            timestamp: Utc::now().timestamp_millis(),
                        }).await;
                    }
                }
            }
        }
    }

    for handle in forwarders.into_values() {
        handle.abort();
    }
    state.fanout.deregister_connection(addr.ip());
}

fn authorize_user_channel(
    state: &WsState,
    wallet: &str,
    auth: Option<&ChannelAuth>,
    bound_wallet: &mut Option<String>,
) -> bool {
    if let Some(bound) = bound_wallet {
        // Once bound, refuse cross-wallet subscriptions outright.
        return bound == wallet;
    }
    let Some(auth) = auth else { return false };
    let Some(secret) = state.secrets.secret_for(wallet) else {
        warn!("no channel secret registered for wallet {wallet}");
        return false;
    };
    if !verify_channel_auth(&secret, auth, Utc::now()) {
        return false;
    }
    *bound_wallet = Some(wallet.to_string());
    true
}
