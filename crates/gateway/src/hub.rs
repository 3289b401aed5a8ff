use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    tokio::{
        sync::{Mutex, mpsc},
        task::JoinHandle,
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use {
    chatcast_config::{ChatcastConfig, HistoryTarget, PersistenceMode},
    chatcast_protocol::ChatMessage,
    chatcast_store::MessageStore,
};

use crate::{
    connection::{ConnectionHandle, Frame},
    dispatcher,
    registry::ConnectionRegistry,
    replay,
};

/// Returned when the hub no longer accepts connections or messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("hub is shut down")]
pub struct HubClosed;

/// Runtime knobs for the hub, usually derived from [`ChatcastConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct HubSettings {
    pub history_limit: usize,
    pub history_target: HistoryTarget,
    pub persistence: PersistenceMode,
    pub outbound_buffer: usize,
    pub send_timeout: Duration,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self::from(&ChatcastConfig::default())
    }
}

impl From<&ChatcastConfig> for HubSettings {
    fn from(config: &ChatcastConfig) -> Self {
        Self {
            history_limit: config.history.limit,
            history_target: config.history.target,
            persistence: config.delivery.persistence,
            outbound_buffer: config.delivery.outbound_buffer,
            send_timeout: config.delivery.send_timeout(),
        }
    }
}

/// Owns the connection registry, the broadcast queue and the dispatcher
/// task that drains it.
pub struct Hub {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn MessageStore>,
    settings: HubSettings,
    queue: mpsc::UnboundedSender<ChatMessage>,
    shutdown: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Hub {
    /// Create the hub and spawn its dispatcher. Must run inside a tokio runtime.
    pub fn start(store: Arc<dyn MessageStore>, settings: HubSettings) -> Arc<Self> {
        let registry = Arc::new(ConnectionRegistry::new());
        let (queue, receiver) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let handle = dispatcher::spawn(Arc::clone(&registry), receiver, shutdown.clone());

        Arc::new(Self {
            registry,
            store,
            settings,
            queue,
            shutdown,
            dispatcher: Mutex::new(Some(handle)),
        })
    }

    pub fn settings(&self) -> &HubSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Register a new connection and start replaying history to it.
    ///
    /// Returns the handle and the receiving end of its outbound queue, which
    /// the caller's writer task drains onto the socket.
    pub fn connect(
        self: &Arc<Self>,
        remote: Option<SocketAddr>,
    ) -> Result<(ConnectionHandle, mpsc::Receiver<Frame>), HubClosed> {
        if self.shutdown.is_cancelled() {
            return Err(HubClosed);
        }
        let (conn, outbound) = ConnectionHandle::new(remote, self.settings.outbound_buffer);
        self.registry.register(conn.clone());
        info!(
            conn_id = conn.conn_id(),
            remote = ?conn.remote(),
            connections = self.registry.len(),
            "client connected"
        );

        if self.settings.history_limit > 0 {
            let hub = Arc::clone(self);
            let joiner = conn.clone();
            tokio::spawn(async move {
                replay::replay_history(&hub, &joiner).await;
            });
        }

        Ok((conn, outbound))
    }

    /// Deregister and close a connection. Unknown ids are ignored.
    pub fn disconnect(&self, conn_id: &str) {
        if let Some(conn) = self.registry.deregister(conn_id) {
            conn.close();
            debug!(
                conn_id,
                connections = self.registry.len(),
                "client deregistered"
            );
        }
    }

    /// Queue a message for broadcast to every live connection.
    pub fn submit(&self, message: ChatMessage) -> Result<(), HubClosed> {
        if self.shutdown.is_cancelled() {
            return Err(HubClosed);
        }
        self.queue.send(message).map_err(|_| HubClosed)
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop accepting work, broadcast what is already queued, then close
    /// every live connection.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self.dispatcher.lock().await.take()
            && let Err(e) = handle.await
        {
            warn!(error = %e, "dispatcher task failed");
        }
        let remaining = self.registry.drain();
        for conn in &remaining {
            conn.close();
        }
        info!(closed = remaining.len(), "hub shut down");
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("connections", &self.registry.len())
            .field("settings", &self.settings)
            .field("shut_down", &self.shutdown.is_cancelled())
            .finish()
    }
}
