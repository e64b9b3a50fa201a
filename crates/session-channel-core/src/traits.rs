//! Core traits and identifiers shared across crates.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::ForwardMsg;

/// Session identifier.
pub type SessionId = Uuid;

/// Delivery failure reported by a sink.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Transient failure; the same message will be offered again.
    #[error("Delivery failed, will retry: {0}")]
    Retry(String),
    /// The client connection is gone; the delivery path stops.
    #[error("Sink closed")]
    Closed,
}

/// Destination of a session's forward messages (the transport layer).
///
/// Implement this trait to move messages onto an actual connection.
/// Messages of one session are offered strictly in enqueue order, and
/// a message is offered again until the sink accepts it or closes.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Deliver one message for `session_id`.
    async fn deliver(&self, session_id: SessionId, msg: &ForwardMsg) -> Result<(), SinkError>;
}

/// Sink backed by an unbounded channel.
///
/// Mostly useful for bridging into a socket writer task and in tests.
#[async_trait]
impl MessageSink for tokio::sync::mpsc::UnboundedSender<(SessionId, ForwardMsg)> {
    async fn deliver(&self, session_id: SessionId, msg: &ForwardMsg) -> Result<(), SinkError> {
        self.send((session_id, msg.clone()))
            .map_err(|_| SinkError::Closed)
    }
}
