//! Wire protocol for client-server communication.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use session_channel_core::{ForwardMsg, MessageSink, SessionId, SinkError};
use tokio::sync::mpsc;

/// Message from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start a login with the named provider.
    Login { provider: String },
    /// Log the current user out.
    Logout,
    /// Ping for keepalive.
    Ping,
}

/// Message from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Session registered for this connection.
    SessionStarted { session_id: String },
    /// A forward message from the session's context.
    Forward { msg: ForwardMsg },
    /// Error message.
    Error { message: String },
    /// Pong response.
    Pong,
}

impl ServerMessage {
    /// Create a session-started message.
    #[must_use]
    pub fn session_started(session_id: SessionId) -> Self {
        Self::SessionStarted {
            session_id: session_id.to_string(),
        }
    }

    /// Create an error message.
    #[must_use]
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self::Error {
            message: message.to_string(),
        }
    }
}

/// Sink that wraps forward messages for a socket writer task.
#[derive(Debug, Clone)]
pub struct ServerSink {
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ServerSink {
    #[must_use]
    pub const fn new(tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl MessageSink for ServerSink {
    async fn deliver(&self, _session_id: SessionId, msg: &ForwardMsg) -> Result<(), SinkError> {
        self.tx
            .send(ServerMessage::Forward { msg: msg.clone() })
            .map_err(|_| SinkError::Closed)
    }
}
