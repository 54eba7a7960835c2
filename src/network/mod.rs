//! Networking: WebSocket transport, wire protocol, and session registry.

pub mod protocol;
pub mod registry;
pub mod server;

pub use protocol::{ClientMessage, ServerMessage};
pub use registry::SessionRegistry;
pub use server::{RelayConfig, RelayError, RelayServer, RelayStores};
