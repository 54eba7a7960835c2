//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket: one JSON
//! object per text frame, discriminated by a `type` string field. Unknown
//! `type` values parse to [`ClientMessage::Unknown`] and are ignored rather
//! than erroring, so newer clients can talk to older servers.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::relay::chat::ChatMessage;
use crate::relay::presence::{PlayerId, PresenceEntry};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
///
/// Any client-asserted player id is ignored; every side effect uses the
/// server-assigned id of the connection the message arrived on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Position/movement report for this connection's player.
    PlayerUpdate(PresenceEntry),

    /// Challenge another player to a 1v1 battle.
    BattleChallenge {
        /// Id of the invited player. Negative or self-targeted ids are
        /// ignored.
        target_id: i64,
        /// Snapshot of the challenger's monster, relayed to the target.
        #[serde(default)]
        monster_data: Option<serde_json::Value>,
    },

    /// Accept the challenge pending against this connection's player.
    BattleAccept {
        /// Id of the original challenger. Negative ids are ignored.
        challenger_id: i64,
        /// Snapshot of the accepter's monster, relayed to the challenger.
        #[serde(default)]
        monster_data: Option<serde_json::Value>,
    },

    /// Decline the challenge pending against this connection's player.
    BattleDecline {
        /// Id of the original challenger. Negative ids are ignored.
        challenger_id: i64,
    },

    /// Send a chat message to everyone.
    ChatSend {
        /// Raw message text; sanitized server-side.
        text: String,
    },

    /// Unrecognized `type` tag. Ignored.
    #[serde(other)]
    Unknown,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once on connect with the server-assigned player id.
    Registered {
        /// The assigned id.
        id: PlayerId,
    },

    /// Presence snapshot, broadcast every tick and once at bootstrap.
    PlayersUpdate {
        /// All connected players' last-known transforms, keyed by id.
        players: BTreeMap<PlayerId, PresenceEntry>,
        /// Server Unix time (float seconds).
        timestamp: f64,
    },

    /// New chat messages, in id order. Carries the bootstrap backlog on
    /// connect and single messages thereafter.
    ChatUpdate {
        /// The messages.
        messages: Vec<ChatMessage>,
    },

    /// Another player has challenged you.
    BattleChallengeReceived {
        /// The challenger's id.
        from: PlayerId,
        /// The challenger's monster snapshot.
        opponent_monster: Option<serde_json::Value>,
    },

    /// A challenge was accepted; the battle begins.
    BattleStart {
        /// Your opponent's id.
        opponent_id: PlayerId,
        /// Your opponent's monster snapshot.
        opponent_monster: Option<serde_json::Value>,
    },

    /// Your challenge was declined.
    BattleDeclined {
        /// The declining player's id.
        by: PlayerId,
    },

    /// Something about your last message was wrong. Never fatal.
    Error {
        /// `"invalid_json"`, `"empty_message"`, or a free-text description.
        message: String,
    },
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
