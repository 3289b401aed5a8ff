use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    tokio::sync::mpsc::{self, error::TrySendError},
    tokio_util::sync::CancellationToken,
};

/// A pre-encoded outbound text frame, shared between every recipient.
pub type Frame = Arc<str>;

/// Why a frame could not be handed to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The client is not draining its queue fast enough.
    #[error("outbound queue full")]
    Backpressure,
    #[error("connection closed")]
    Closed,
}

/// Shared handle to one live client session.
///
/// Writes go through a bounded queue drained by the connection's single
/// writer task, so concurrent producers never interleave on the socket.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    conn_id: Arc<str>,
    remote: Option<SocketAddr>,
    sender: mpsc::Sender<Frame>,
    closed: CancellationToken,
}

impl ConnectionHandle {
    /// Create a handle and the receiving end of its outbound queue.
    pub fn new(remote: Option<SocketAddr>, buffer: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let handle = Self {
            conn_id: Arc::from(uuid::Uuid::new_v4().to_string()),
            remote,
            sender,
            closed: CancellationToken::new(),
        };
        (handle, receiver)
    }

    pub fn conn_id(&self) -> &str {
        &self.conn_id
    }

    pub fn remote(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// Queue a frame without waiting. A full queue counts as a failed write.
    pub fn try_deliver(&self, frame: Frame) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Closed);
        }
        self.sender.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Backpressure,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Queue a frame, waiting up to `timeout` for room.
    pub async fn deliver(&self, frame: Frame, timeout: Duration) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Closed);
        }
        match tokio::time::timeout(timeout, self.sender.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(DeliveryError::Closed),
            Err(_) => Err(DeliveryError::Backpressure),
        }
    }

    /// Signal the reader and writer tasks to stop. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }
}
