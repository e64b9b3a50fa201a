//! Per-session forward-message queue with a separate delivery path.

use std::{
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{
    ForwardMsg,
    traits::{MessageSink, SessionId, SinkError},
};

/// First delay before re-offering a message the sink asked to retry.
const INITIAL_BACKOFF: Duration = Duration::from_millis(10);

/// Upper bound for the retry delay.
const MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Sending half of a session's queue.
///
/// Enqueueing never blocks: the queue is unbounded and drained by a
/// [`ForwardReceiver`] elsewhere. Once closed, every later message is
/// dropped, so nothing enqueued after teardown can reach a client.
pub struct ForwardChannel {
    session_id: SessionId,
    sender: RwLock<Option<mpsc::UnboundedSender<ForwardMsg>>>,
}

impl ForwardChannel {
    /// Create a channel for `session_id` and the receiver that drains it.
    #[must_use]
    pub fn new(session_id: SessionId) -> (Self, ForwardReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Self {
            session_id,
            sender: RwLock::new(Some(tx)),
        };
        (channel, ForwardReceiver { session_id, rx })
    }

    /// Session this channel belongs to.
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Append a message to the queue.
    ///
    /// Returns `false` if the channel is closed or the receiver is gone;
    /// the message is dropped in that case.
    pub fn send(&self, msg: ForwardMsg) -> bool {
        let guard = self.sender.read().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            tracing::debug!(session_id = %self.session_id, kind = msg.kind(), "Dropping message for closed channel");
            return false;
        };
        if tx.send(msg).is_err() {
            tracing::debug!(session_id = %self.session_id, "Receiver gone, message dropped");
            return false;
        }
        true
    }

    /// Close the channel. Messages already queued are still delivered.
    pub fn close(&self) {
        let mut guard = self.sender.write().unwrap_or_else(PoisonError::into_inner);
        if guard.take().is_some() {
            tracing::debug!(session_id = %self.session_id, "Forward channel closed");
        }
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl std::fmt::Debug for ForwardChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardChannel")
            .field("session_id", &self.session_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Receiving half of a session's queue, owned by the transport.
#[derive(Debug)]
pub struct ForwardReceiver {
    session_id: SessionId,
    rx: mpsc::UnboundedReceiver<ForwardMsg>,
}

impl ForwardReceiver {
    /// Session this receiver drains.
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Wait for the next message. `None` once the channel is closed and empty.
    pub async fn recv(&mut self) -> Option<ForwardMsg> {
        self.rx.recv().await
    }

    /// Take every message queued right now, in order, without waiting.
    pub fn try_recv_all(&mut self) -> Vec<ForwardMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }

    /// Stream of messages in enqueue order.
    #[must_use]
    pub fn into_stream(self) -> UnboundedReceiverStream<ForwardMsg> {
        UnboundedReceiverStream::new(self.rx)
    }

    /// Drain this queue into `sink` on a background task.
    ///
    /// Each message is offered until the sink accepts it; a sink reporting
    /// [`SinkError::Closed`] ends the task. The task also ends once the
    /// channel is closed and fully drained.
    pub fn spawn_forwarder(self, sink: Arc<dyn MessageSink>) -> tokio::task::JoinHandle<()> {
        let session_id = self.session_id;
        tokio::spawn(async move {
            let mut stream = self.into_stream();

            while let Some(msg) = stream.next().await {
                if !deliver_with_retry(sink.as_ref(), session_id, &msg).await {
                    tracing::debug!(%session_id, "Sink closed, stopping forwarder");
                    return;
                }
            }
            tracing::debug!(%session_id, "Forward channel drained");
        })
    }
}

async fn deliver_with_retry(sink: &dyn MessageSink, session_id: SessionId, msg: &ForwardMsg) -> bool {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match sink.deliver(session_id, msg).await {
            Ok(()) => return true,
            Err(SinkError::Closed) => return false,
            Err(SinkError::Retry(reason)) => {
                tracing::warn!(%session_id, kind = msg.kind(), %reason, "Delivery failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}
