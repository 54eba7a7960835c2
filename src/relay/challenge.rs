//! Challenge Table
//!
//! Pending 1v1 battle challenges, keyed by the invited player. At most one
//! pending incoming challenge per target: a second challenge to the same
//! target overwrites the first with no notification to the first challenger
//! (last-challenger-wins, a deliberate product behavior). Challenges have no
//! expiry; they live until consumed or the target disconnects.

use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::relay::presence::PlayerId;
use crate::relay::unix_timestamp;

/// A pending battle invitation.
#[derive(Debug, Clone, PartialEq)]
pub struct Challenge {
    /// The challenger.
    pub from_id: PlayerId,
    /// The invited player (table key).
    pub to_id: PlayerId,
    /// When the challenge was issued (Unix float seconds).
    pub timestamp: f64,
    /// Snapshot of the challenger's monster, handed to the target on accept.
    pub challenger_monster: Option<serde_json::Value>,
}

/// Shared table of pending challenges keyed by target id.
#[derive(Default)]
pub struct ChallengeTable {
    pending: RwLock<BTreeMap<PlayerId, Challenge>>,
}

impl ChallengeTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a challenge against `to_id`, unconditionally replacing any
    /// existing one. Callers are responsible for rejecting self-challenges.
    pub async fn add_challenge(
        &self,
        from_id: PlayerId,
        to_id: PlayerId,
        monster_data: Option<serde_json::Value>,
    ) -> Challenge {
        let challenge = Challenge {
            from_id,
            to_id,
            timestamp: unix_timestamp(),
            challenger_monster: monster_data,
        };
        let mut pending = self.pending.write().await;
        pending.insert(to_id, challenge.clone());
        challenge
    }

    /// The pending challenge aimed at `to_id`, if any.
    pub async fn get_challenge(&self, to_id: PlayerId) -> Option<Challenge> {
        let pending = self.pending.read().await;
        pending.get(&to_id).cloned()
    }

    /// Remove the challenge keyed by `to_id`. Idempotent.
    pub async fn remove_challenge(&self, to_id: PlayerId) {
        let mut pending = self.pending.write().await;
        pending.remove(&to_id);
    }
}
