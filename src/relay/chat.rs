//! Chat Log
//!
//! Append-only bounded buffer of chat messages with monotonic ids. Ordering
//! is guaranteed by id assignment, never by timestamp; timestamps are
//! informational only. The log is compacted in batches rather than on every
//! insert: past 1000 entries it is trimmed down to the most recent 800.

use std::collections::VecDeque;
use serde::{Serialize, Deserialize};
use tokio::sync::RwLock;

use crate::relay::presence::PlayerId;
use crate::relay::unix_timestamp;

/// Maximum stored length of a chat message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 200;

/// Log size that triggers compaction.
const COMPACT_THRESHOLD: usize = 1000;

/// Log size after compaction.
const COMPACT_KEEP: usize = 800;

/// Messages returned for a bootstrap query (`list_since(0)`).
const BOOTSTRAP_LIMIT: usize = 100;

/// Messages returned for a catch-up query (`list_since(k)`, k > 0).
const CATCHUP_LIMIT: usize = 200;

/// A single immutable chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Sequential message id, assigned from 1, strictly increasing.
    pub id: u64,
    /// Server-assigned id of the sender.
    pub from: PlayerId,
    /// Sanitized message text.
    pub text: String,
    /// Unix timestamp (float seconds). Informational only.
    pub ts: f64,
}

/// Chat store errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Message text was empty after trimming.
    #[error("empty message")]
    EmptyMessage,
}

#[derive(Default)]
struct ChatLogInner {
    next_id: u64,
    messages: VecDeque<ChatMessage>,
}

/// Shared bounded chat log.
pub struct ChatLog {
    inner: RwLock<ChatLogInner>,
}

impl ChatLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(ChatLogInner {
                next_id: 1,
                messages: VecDeque::new(),
            }),
        }
    }

    /// Sanitize and append a message. Text is trimmed and truncated to
    /// [`MAX_MESSAGE_CHARS`]; empty-after-trim text is rejected without
    /// touching the log.
    pub async fn add(&self, sender_id: PlayerId, text: &str) -> Result<ChatMessage, ChatError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let text: String = trimmed.chars().take(MAX_MESSAGE_CHARS).collect();

        let mut inner = self.inner.write().await;
        let msg = ChatMessage {
            id: inner.next_id,
            from: sender_id,
            text,
            ts: unix_timestamp(),
        };
        inner.next_id += 1;
        inner.messages.push_back(msg.clone());

        // Batched compaction, not on every insert.
        if inner.messages.len() > COMPACT_THRESHOLD {
            let excess = inner.messages.len() - COMPACT_KEEP;
            inner.messages.drain(..excess);
        }

        Ok(msg)
    }

    /// Messages newer than `since_id`, in id order.
    ///
    /// `since_id == 0` is the bootstrap case for a newly connected client and
    /// returns the last [`BOOTSTRAP_LIMIT`] messages. Otherwise returns all
    /// messages with id > `since_id`, capped to the newest [`CATCHUP_LIMIT`]
    /// of the matching set.
    pub async fn list_since(&self, since_id: u64) -> Vec<ChatMessage> {
        let inner = self.inner.read().await;
        if since_id == 0 {
            let skip = inner.messages.len().saturating_sub(BOOTSTRAP_LIMIT);
            return inner.messages.iter().skip(skip).cloned().collect();
        }

        let mut out: Vec<ChatMessage> = inner
            .messages
            .iter()
            .filter(|m| m.id > since_id)
            .cloned()
            .collect();
        if out.len() > CATCHUP_LIMIT {
            out.drain(..out.len() - CATCHUP_LIMIT);
        }
        out
    }

    /// Number of stored messages.
    pub async fn len(&self) -> usize {
        self.inner.read().await.messages.len()
    }

    /// Whether the log holds no messages.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for ChatLog {
    fn default() -> Self {
        Self::new()
    }
}
