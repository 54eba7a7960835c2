//! Presence Store
//!
//! Last-known transform for every connected player: position, map, facing,
//! moving flag. Written at high frequency by connection handlers (clients
//! send ~60 updates/sec) and read by the broadcast loop, which takes a
//! point-in-time copy rather than holding the lock during fan-out.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use tokio::sync::RwLock;

/// Server-assigned player identifier. Allocated sequentially from 1 and
/// never reused while the process runs.
pub type PlayerId = u64;

/// Facing direction reported by the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Facing up.
    Up,
    /// Facing down (the spawn default).
    #[default]
    Down,
    /// Facing left.
    Left,
    /// Facing right.
    Right,
}

/// A player's last-reported transform. Doubles as the wire shape inside
/// `player_update` and `players_update`; missing fields on the inbound side
/// fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceEntry {
    /// World X coordinate.
    pub x: f64,
    /// World Y coordinate.
    pub y: f64,
    /// Name of the map the player is on.
    pub map: String,
    /// Facing direction.
    pub direction: Direction,
    /// Whether the player is currently moving.
    pub is_moving: bool,
}

/// Shared store of per-player presence entries.
///
/// Invariant: an entry exists for an id iff a session exists for that id.
/// Entries are seeded with defaults at registration and removed at teardown.
#[derive(Default)]
pub struct PresenceStore {
    players: RwLock<BTreeMap<PlayerId, PresenceEntry>>,
}

impl PresenceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditionally overwrite the entry for `player_id`. Last write wins;
    /// there are no sequence numbers, so a reordered late update silently
    /// clobbers a newer one.
    pub async fn update(&self, player_id: PlayerId, entry: PresenceEntry) {
        let mut players = self.players.write().await;
        players.insert(player_id, entry);
    }

    /// Seed a default entry for a freshly registered player so the entry
    /// appears in broadcasts before the first `player_update` arrives.
    pub async fn seed(&self, player_id: PlayerId) {
        let mut players = self.players.write().await;
        players.entry(player_id).or_default();
    }

    /// Consistent point-in-time copy for broadcast. The caller reads the
    /// copy while writers continue on the live map.
    pub async fn snapshot(&self) -> BTreeMap<PlayerId, PresenceEntry> {
        let players = self.players.read().await;
        players.clone()
    }

    /// Remove the entry on disconnect. Idempotent.
    pub async fn remove(&self, player_id: PlayerId) {
        let mut players = self.players.write().await;
        players.remove(&player_id);
    }
}
