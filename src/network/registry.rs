//! Session Registry
//!
//! Owns the mapping from assigned player id to that connection's outbound
//! message channel. This is the only place other connections (and the
//! broadcast loop) can reach a client by id. Sends are best-effort: a full
//! or closed channel is a failure the caller is expected to ignore.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::RwLock;

use crate::network::protocol::ServerMessage;
use crate::relay::presence::PlayerId;

/// Registry of live sessions.
pub struct SessionRegistry {
    /// Next id to hand out. Ids start at 1 and are never reused.
    next_id: AtomicU64,
    /// Outbound channel per registered player.
    senders: RwLock<BTreeMap<PlayerId, mpsc::Sender<ServerMessage>>>,
    /// Sessions skipped by fan-out after a failed broadcast send. Direct
    /// sends keep working; full teardown belongs to the connection handler.
    unreachable: RwLock<BTreeSet<PlayerId>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            senders: RwLock::new(BTreeMap::new()),
            unreachable: RwLock::new(BTreeSet::new()),
        }
    }

    /// Allocate the next player id. Safe against concurrent registration.
    pub fn register(&self) -> PlayerId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Bind the outbound channel for `player_id`. One bind per connection;
    /// an overwrite is not expected but harmless.
    pub async fn bind(&self, player_id: PlayerId, sender: mpsc::Sender<ServerMessage>) {
        let mut senders = self.senders.write().await;
        senders.insert(player_id, sender);
    }

    /// Remove the binding for `player_id`. Idempotent.
    pub async fn unbind(&self, player_id: PlayerId) {
        {
            let mut senders = self.senders.write().await;
            senders.remove(&player_id);
        }
        let mut unreachable = self.unreachable.write().await;
        unreachable.remove(&player_id);
    }

    /// Best-effort send to one player. Returns `false` if the id is unknown
    /// or the channel is closed or full (a backpressured client is treated
    /// the same as a gone one). No retry, no queueing beyond the channel.
    ///
    /// The sender is cloned out of the lock so no store lock is held while
    /// the message is enqueued.
    pub async fn send_to(&self, player_id: PlayerId, message: ServerMessage) -> bool {
        let sender = {
            let senders = self.senders.read().await;
            senders.get(&player_id).cloned()
        };
        match sender {
            Some(tx) => tx.try_send(message).is_ok(),
            None => false,
        }
    }

    /// Fan a message out to every bound session not already marked
    /// unreachable. Sessions whose send fails are marked unreachable after
    /// the pass completes (never mid-iteration) and skipped by future
    /// passes; their binding stays intact, so targeted [`send_to`] traffic
    /// still reaches them until the connection handler tears them down.
    /// Returns the ids that failed this pass.
    ///
    /// [`send_to`]: SessionRegistry::send_to
    pub async fn broadcast(&self, message: &ServerMessage) -> Vec<PlayerId> {
        let skip: BTreeSet<PlayerId> = {
            let unreachable = self.unreachable.read().await;
            unreachable.clone()
        };
        let senders: Vec<(PlayerId, mpsc::Sender<ServerMessage>)> = {
            let senders = self.senders.read().await;
            senders
                .iter()
                .filter(|(id, _)| !skip.contains(id))
                .map(|(id, tx)| (*id, tx.clone()))
                .collect()
        };

        let mut failed = Vec::new();
        for (id, tx) in senders {
            if tx.try_send(message.clone()).is_err() {
                failed.push(id);
            }
        }

        if !failed.is_empty() {
            let mut unreachable = self.unreachable.write().await;
            unreachable.extend(failed.iter().copied());
        }
        failed
    }

    /// Number of bound sessions.
    pub async fn session_count(&self) -> usize {
        self.senders.read().await.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
