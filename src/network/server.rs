//! WebSocket Relay Server
//!
//! Accept loop, per-connection control flow, and the periodic presence
//! broadcast. One task per connection handles inbound messages in arrival
//! order; a single ticker task fans the presence snapshot out to every
//! session. The two coordinate only through the shared stores.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, broadcast};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug};

use crate::network::protocol::{ClientMessage, ServerMessage};
use crate::network::registry::SessionRegistry;
use crate::relay::challenge::ChallengeTable;
use crate::relay::chat::{ChatError, ChatLog};
use crate::relay::presence::{PlayerId, PresenceStore};
use crate::relay::unix_timestamp;

/// Outbound queue depth per connection. A client that falls this far behind
/// is treated as gone.
const OUTBOUND_QUEUE: usize = 64;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Presence broadcast rate (Hz).
    pub broadcast_rate: u32,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8989".parse().unwrap(),
            broadcast_rate: 60,
            max_connections: 1000,
        }
    }
}

/// Relay server errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// The four shared stores, constructed once at startup and handed by `Arc`
/// to every connection handler and the broadcast loop. Each store locks
/// independently; there are no cross-store transactions.
pub struct RelayStores {
    /// Player id to outbound channel.
    pub sessions: SessionRegistry,
    /// Player id to last-known transform.
    pub presence: PresenceStore,
    /// Bounded chat history.
    pub chat: ChatLog,
    /// Pending battle challenges keyed by target.
    pub challenges: ChallengeTable,
}

impl RelayStores {
    /// Create empty stores.
    pub fn new() -> Self {
        Self {
            sessions: SessionRegistry::new(),
            presence: PresenceStore::new(),
            chat: ChatLog::new(),
            challenges: ChallengeTable::new(),
        }
    }
}

impl Default for RelayStores {
    fn default() -> Self {
        Self::new()
    }
}

/// The relay server.
pub struct RelayServer {
    /// Server configuration.
    config: RelayConfig,
    /// Shared state.
    stores: Arc<RelayStores>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl RelayServer {
    /// Create a new relay server.
    pub fn new(config: RelayConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            stores: Arc::new(RelayStores::new()),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), RelayError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Relay server listening on {}", self.config.bind_addr);
        self.serve(listener).await
    }

    /// Serve connections from a pre-bound listener. Split out from [`run`]
    /// so tests can bind an ephemeral port themselves.
    ///
    /// [`run`]: RelayServer::run
    pub async fn serve(&self, listener: TcpListener) -> Result<(), RelayError> {
        // The broadcast loop outlives every individual connection.
        let broadcast_stores = self.stores.clone();
        let broadcast_shutdown = self.shutdown_tx.subscribe();
        let rate = self.config.broadcast_rate;
        let broadcast_handle = tokio::spawn(async move {
            Self::run_broadcast_loop(broadcast_stores, rate, broadcast_shutdown).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.stores.sessions.session_count().await >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }
                            debug!("New connection from {}", addr);
                            let stores = self.stores.clone();
                            tokio::spawn(async move {
                                Self::handle_connection(stores, stream, addr).await;
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        broadcast_handle.abort();
        Ok(())
    }

    /// Signal the server to stop accepting and broadcasting.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Number of currently bound sessions.
    pub async fn session_count(&self) -> usize {
        self.stores.sessions.session_count().await
    }

    /// Shared stores, for embedding the relay in a larger process.
    pub fn stores(&self) -> Arc<RelayStores> {
        self.stores.clone()
    }

    /// Per-connection control loop: register, bootstrap, dispatch inbound
    /// messages in arrival order, then tear down exactly once.
    async fn handle_connection(stores: Arc<RelayStores>, stream: TcpStream, addr: SocketAddr) {
        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!("WebSocket handshake failed for {}: {}", addr, e);
                return;
            }
        };

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_QUEUE);

        // Writer task: the only writer to this socket. Serializes queued
        // messages to text frames until the channel or the socket closes.
        let sender_task = tokio::spawn(async move {
            while let Some(msg) = msg_rx.recv().await {
                let text = match msg.to_json() {
                    Ok(t) => t,
                    Err(e) => {
                        error!("Failed to serialize message: {}", e);
                        continue;
                    }
                };
                if ws_sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        let player_id = stores.sessions.register();
        stores.presence.seed(player_id).await;
        info!("Player {} connected from {}", player_id, addr);

        // Bootstrap, in fixed order: registered, presence snapshot, chat
        // backlog. Best-effort; a dead socket is caught by the read loop.
        // The session is bound only after these are queued so a broadcast
        // tick cannot jump ahead of `registered`.
        let _ = msg_tx.send(ServerMessage::Registered { id: player_id }).await;
        let players = stores.presence.snapshot().await;
        let _ = msg_tx
            .send(ServerMessage::PlayersUpdate { players, timestamp: unix_timestamp() })
            .await;
        let messages = stores.chat.list_since(0).await;
        let _ = msg_tx.send(ServerMessage::ChatUpdate { messages }).await;

        stores.sessions.bind(player_id, msg_tx.clone()).await;

        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    Self::handle_frame(&stores, player_id, &text, &msg_tx).await;
                }
                Ok(Message::Close(_)) => {
                    debug!("Player {} closed the connection", player_id);
                    break;
                }
                // Ping/pong are handled by the transport; binary frames are
                // not part of the protocol.
                Ok(_) => {}
                Err(e) => {
                    debug!("WebSocket error for player {}: {}", player_id, e);
                    break;
                }
            }
        }

        // Teardown runs exactly once, on this single exit path. Challenges
        // where this player is the challenger are intentionally left in
        // place; the target discovers the absence on accept/decline.
        stores.presence.remove(player_id).await;
        stores.challenges.remove_challenge(player_id).await;
        stores.sessions.unbind(player_id).await;
        sender_task.abort();
        info!("Player {} disconnected", player_id);
    }

    /// Parse one inbound text frame and dispatch it. Parse failures produce
    /// a best-effort `error` reply to this connection only; the loop
    /// continues regardless.
    async fn handle_frame(
        stores: &Arc<RelayStores>,
        player_id: PlayerId,
        text: &str,
        msg_tx: &mpsc::Sender<ServerMessage>,
    ) {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(_) => {
                let _ = msg_tx
                    .send(ServerMessage::Error { message: "invalid_json".to_string() })
                    .await;
                return;
            }
        };

        let msg = match serde_json::from_value::<ClientMessage>(value) {
            Ok(m) => m,
            Err(e) => {
                debug!("Malformed message from player {}: {}", player_id, e);
                let _ = msg_tx
                    .send(ServerMessage::Error { message: e.to_string() })
                    .await;
                return;
            }
        };

        match msg {
            ClientMessage::PlayerUpdate(entry) => {
                // Server-assigned id only; clients cannot impersonate.
                stores.presence.update(player_id, entry).await;
            }
            ClientMessage::BattleChallenge { target_id, monster_data } => {
                Self::handle_battle_challenge(stores, player_id, target_id, monster_data).await;
            }
            ClientMessage::BattleAccept { challenger_id, monster_data } => {
                Self::handle_battle_accept(stores, player_id, challenger_id, monster_data, msg_tx)
                    .await;
            }
            ClientMessage::BattleDecline { challenger_id } => {
                Self::handle_battle_decline(stores, player_id, challenger_id).await;
            }
            ClientMessage::ChatSend { text } => {
                Self::handle_chat_send(stores, player_id, &text, msg_tx).await;
            }
            ClientMessage::Unknown => {
                debug!("Unhandled message type from player {}", player_id);
            }
        }
    }

    /// Store a challenge against the target and notify them. The stored
    /// record persists whether or not the notification lands.
    async fn handle_battle_challenge(
        stores: &Arc<RelayStores>,
        player_id: PlayerId,
        target_id: i64,
        monster_data: Option<serde_json::Value>,
    ) {
        if target_id < 0 || target_id as u64 == player_id {
            return;
        }
        let target = target_id as u64;
        debug!("Player {} challenges {}", player_id, target);

        stores
            .challenges
            .add_challenge(player_id, target, monster_data.clone())
            .await;

        let delivered = stores
            .sessions
            .send_to(
                target,
                ServerMessage::BattleChallengeReceived {
                    from: player_id,
                    opponent_monster: monster_data,
                },
            )
            .await;
        if !delivered {
            debug!("Challenge target {} unreachable", target);
        }
    }

    /// Consume the challenge pending against the accepter and start the
    /// battle on both sides. The two sends are independent: failing to
    /// reach the challenger does not prevent confirming to the accepter.
    async fn handle_battle_accept(
        stores: &Arc<RelayStores>,
        player_id: PlayerId,
        challenger_id: i64,
        monster_data: Option<serde_json::Value>,
        msg_tx: &mpsc::Sender<ServerMessage>,
    ) {
        if challenger_id < 0 {
            return;
        }
        let challenger = challenger_id as u64;
        debug!("Player {} accepts challenge from {}", player_id, challenger);

        let challenger_monster = stores
            .challenges
            .get_challenge(player_id)
            .await
            .and_then(|c| c.challenger_monster);
        stores.challenges.remove_challenge(player_id).await;

        let _ = stores
            .sessions
            .send_to(
                challenger,
                ServerMessage::BattleStart {
                    opponent_id: player_id,
                    opponent_monster: monster_data,
                },
            )
            .await;
        let _ = msg_tx
            .send(ServerMessage::BattleStart {
                opponent_id: challenger,
                opponent_monster: challenger_monster,
            })
            .await;
    }

    /// Drop the challenge pending against the decliner and notify the
    /// challenger.
    async fn handle_battle_decline(
        stores: &Arc<RelayStores>,
        player_id: PlayerId,
        challenger_id: i64,
    ) {
        if challenger_id < 0 {
            return;
        }
        let challenger = challenger_id as u64;
        debug!("Player {} declines challenge from {}", player_id, challenger);

        stores.challenges.remove_challenge(player_id).await;
        let _ = stores
            .sessions
            .send_to(challenger, ServerMessage::BattleDeclined { by: player_id })
            .await;
    }

    /// Append to the chat log and fan the new message out to every session,
    /// sender included. An empty-after-trim message gets an `error` reply to
    /// the sender only.
    async fn handle_chat_send(
        stores: &Arc<RelayStores>,
        player_id: PlayerId,
        text: &str,
        msg_tx: &mpsc::Sender<ServerMessage>,
    ) {
        // Pre-check mirroring the log's own rejection of empty text.
        if text.is_empty() {
            return;
        }

        match stores.chat.add(player_id, text).await {
            Ok(msg) => {
                let _ = stores
                    .sessions
                    .broadcast(&ServerMessage::ChatUpdate { messages: vec![msg] })
                    .await;
            }
            Err(ChatError::EmptyMessage) => {
                let _ = msg_tx
                    .send(ServerMessage::Error { message: "empty_message".to_string() })
                    .await;
            }
        }
    }

    /// Perpetual presence fan-out, independent of any connection. Every tick
    /// takes a snapshot and pushes it to all sessions; the registry drops
    /// sessions whose send failed from future fan-out after the pass, never
    /// mid-iteration. Slow clients are never waited on.
    async fn run_broadcast_loop(
        stores: Arc<RelayStores>,
        broadcast_rate: u32,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let mut tick_interval = interval(tick_duration(broadcast_rate));
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    let players = stores.presence.snapshot().await;
                    let message = ServerMessage::PlayersUpdate {
                        players,
                        timestamp: unix_timestamp(),
                    };

                    // The registry stops fanning out to failed sessions on
                    // its own; full teardown belongs to the connection
                    // handler.
                    let failed = stores.sessions.broadcast(&message).await;
                    for id in failed {
                        debug!("Dropping unreachable session {} from broadcast", id);
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    }
}

/// Tick interval for a broadcast rate. A zero rate is clamped to 1 Hz
/// rather than dividing by zero.
fn tick_duration(broadcast_rate: u32) -> Duration {
    Duration::from_micros(1_000_000 / broadcast_rate.max(1) as u64)
}
