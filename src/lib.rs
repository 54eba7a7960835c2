//! # Wildmon Relay Server
//!
//! Real-time multiplayer relay for the Wildmon game client: presence
//! broadcast, chat, and 1v1 battle-challenge matchmaking over persistent
//! WebSocket connections.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   WILDMON RELAY SERVER                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  relay/            - Shared in-memory stores                 │
//! │  ├── presence.rs   - Last-known player transforms            │
//! │  ├── chat.rs       - Bounded chat log with monotonic ids     │
//! │  └── challenge.rs  - Pending 1v1 battle challenges           │
//! │                                                              │
//! │  network/          - Transport and protocol                  │
//! │  ├── protocol.rs   - Tagged JSON message types               │
//! │  ├── registry.rs   - Player id -> outbound channel           │
//! │  └── server.rs     - WebSocket server + broadcast loop       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Delivery model
//!
//! The relay is single-process and in-memory, with no persistence and no
//! delivery guarantees: every cross-session send is best-effort and a
//! failure is silently treated as "that client is gone". One task per
//! connection processes inbound messages strictly in arrival order; a
//! single ticker task fans the presence snapshot out to all sessions at
//! [`BROADCAST_RATE`] Hz. The stores lock independently and no lock is
//! ever held across a send.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod network;
pub mod relay;

// Re-export commonly used types
pub use network::protocol::{ClientMessage, ServerMessage};
pub use network::registry::SessionRegistry;
pub use network::server::{RelayConfig, RelayError, RelayServer, RelayStores};
pub use relay::challenge::{Challenge, ChallengeTable};
pub use relay::chat::{ChatError, ChatLog, ChatMessage};
pub use relay::presence::{Direction, PlayerId, PresenceEntry, PresenceStore};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Presence broadcast rate (Hz)
pub const BROADCAST_RATE: u32 = 60;

/// Default listen port
pub const DEFAULT_PORT: u16 = 8989;
