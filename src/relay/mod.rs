//! In-memory relay state stores.
//!
//! Each store owns its own map/log behind an internal lock and exposes only
//! short-held atomic operations. Stores are constructed once at process start
//! and shared by `Arc` into the connection handlers and the broadcast loop;
//! nothing here touches the transport.

pub mod challenge;
pub mod chat;
pub mod presence;

/// Current Unix time as float seconds, matching the wire format the game
/// clients expect for `ts` / `timestamp` fields.
pub(crate) fn unix_timestamp() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
