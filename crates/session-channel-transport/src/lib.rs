//! Transport layer for session channels.
//!
//! Provides:
//! - Wire protocol (JSON)
//! - WebSocket transport and auth endpoints (feature: websocket)

pub mod protocol;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use protocol::{ClientMessage, ServerMessage, ServerSink};
