//! Single consumer of the broadcast queue.

use std::sync::Arc;

use {
    tokio::{sync::mpsc, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{debug, warn},
};

use chatcast_protocol::ChatMessage;

use crate::{
    connection::Frame,
    registry::{ConnectionRegistry, Liveness},
};

/// Outcome of writing one frame to every registered connection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanOut {
    pub delivered: usize,
    pub dropped: usize,
}

/// Encode a message once so every recipient shares the same frame.
pub fn encode_frame(message: &ChatMessage) -> Option<Frame> {
    match message.encode() {
        Ok(text) => Some(Arc::from(text)),
        Err(e) => {
            warn!(error = %e, "failed to encode chat message");
            None
        },
    }
}

/// Write `frame` to every live connection.
///
/// A failed write closes and deregisters that connection only; the rest of
/// the pass continues.
pub fn fan_out(registry: &ConnectionRegistry, frame: &Frame) -> FanOut {
    let mut delivered = 0;
    let dead = registry.for_each_live(|conn| match conn.try_deliver(Arc::clone(frame)) {
        Ok(()) => {
            delivered += 1;
            Liveness::Alive
        },
        Err(e) => {
            warn!(
                conn_id = conn.conn_id(),
                error = %e,
                "broadcast write failed, dropping connection"
            );
            Liveness::Dead
        },
    });
    for conn in &dead {
        conn.close();
    }
    FanOut {
        delivered,
        dropped: dead.len(),
    }
}

pub(crate) fn spawn(
    registry: Arc<ConnectionRegistry>,
    queue: mpsc::UnboundedReceiver<ChatMessage>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run(registry, queue, shutdown))
}

/// Broadcast queued messages in FIFO order until shutdown.
///
/// On shutdown the queue stops accepting messages and whatever is already
/// queued is still broadcast before the loop exits.
async fn run(
    registry: Arc<ConnectionRegistry>,
    mut queue: mpsc::UnboundedReceiver<ChatMessage>,
    shutdown: CancellationToken,
) {
    debug!("dispatcher started");
    loop {
        let next = tokio::select! {
            biased;
            message = queue.recv() => message,
            _ = shutdown.cancelled() => {
                queue.close();
                queue.recv().await
            },
        };
        let Some(message) = next else { break };
        dispatch(&registry, &message);
    }
    debug!("dispatcher stopped");
}

fn dispatch(registry: &ConnectionRegistry, message: &ChatMessage) {
    let Some(frame) = encode_frame(message) else {
        return;
    };
    let result = fan_out(registry, &frame);
    debug!(
        delivered = result.delivered,
        dropped = result.dropped,
        "broadcast message"
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::connection::ConnectionHandle;

    fn registered(registry: &ConnectionRegistry) -> (ConnectionHandle, mpsc::Receiver<Frame>) {
        let (conn, rx) = ConnectionHandle::new(None, 16);
        registry.register(conn.clone());
        (conn, rx)
    }

    async fn recv(rx: &mut mpsc::Receiver<Frame>) -> ChatMessage {
        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        ChatMessage::decode(&frame).unwrap()
    }

    #[test]
    fn fan_out_reaches_everyone() {
        let registry = ConnectionRegistry::new();
        let (_a, mut rx_a) = registered(&registry);
        let (_b, mut rx_b) = registered(&registry);
        let frame = encode_frame(&ChatMessage::new("a@x.com", "alice", "hi")).unwrap();

        let result = fan_out(&registry, &frame);

        assert_eq!(result, FanOut {
            delivered: 2,
            dropped: 0
        });
        assert_eq!(rx_a.try_recv().unwrap(), frame);
        assert_eq!(rx_b.try_recv().unwrap(), frame);
    }

    #[test]
    fn failed_write_is_isolated() {
        let registry = ConnectionRegistry::new();
        let (a, rx_a) = registered(&registry);
        let (_b, mut rx_b) = registered(&registry);
        let (_c, mut rx_c) = registered(&registry);
        drop(rx_a);

        let frame = encode_frame(&ChatMessage::new("", "bob", "still here")).unwrap();
        let result = fan_out(&registry, &frame);

        assert_eq!(result, FanOut {
            delivered: 2,
            dropped: 1
        });
        assert!(a.is_closed());
        assert!(!registry.contains(a.conn_id()));
        assert_eq!(rx_b.try_recv().unwrap(), frame);
        assert_eq!(rx_c.try_recv().unwrap(), frame);
    }

    #[test]
    fn deregistration_racing_fan_out_stops_delivery() {
        const PASSES: usize = 200;
        let registry = Arc::new(ConnectionRegistry::new());
        let mut leaving: Vec<_> = (0..32)
            .map(|_| {
                let (conn, rx) = ConnectionHandle::new(None, PASSES);
                registry.register(conn.clone());
                (conn, rx)
            })
            .collect();
        let (staying, mut rx_staying) = ConnectionHandle::new(None, PASSES);
        registry.register(staying);

        let broadcaster = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                let frame: Frame = Arc::from("tick");
                for _ in 0..PASSES {
                    fan_out(&registry, &frame);
                }
            })
        };

        // Whatever a connection holds once deregistration returns is all it
        // will ever get.
        for (conn, rx) in &mut leaving {
            registry.deregister(conn.conn_id());
            conn.close();
            while rx.try_recv().is_ok() {}
        }
        broadcaster.join().unwrap();

        for (conn, rx) in &mut leaving {
            assert!(rx.try_recv().is_err(), "{} got a late frame", conn.conn_id());
        }
        let mut received = 0;
        while rx_staying.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, PASSES);
    }

    #[test]
    fn slow_connection_is_dropped() {
        let registry = ConnectionRegistry::new();
        let (slow, _rx_slow) = ConnectionHandle::new(None, 1);
        registry.register(slow.clone());
        let (_fast, mut rx_fast) = registered(&registry);

        let first = encode_frame(&ChatMessage::new("", "a", "1")).unwrap();
        let second = encode_frame(&ChatMessage::new("", "a", "2")).unwrap();
        fan_out(&registry, &first);
        let result = fan_out(&registry, &second);

        assert_eq!(result.dropped, 1);
        assert!(slow.is_closed());
        assert_eq!(registry.len(), 1);
        assert_eq!(rx_fast.try_recv().unwrap(), first);
        assert_eq!(rx_fast.try_recv().unwrap(), second);
    }

    #[tokio::test]
    async fn dispatcher_preserves_fifo_order() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (_a, mut rx_a) = registered(&registry);
        let (_b, mut rx_b) = registered(&registry);
        let (tx, queue) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let handle = spawn(Arc::clone(&registry), queue, shutdown.clone());

        for i in 0..10 {
            tx.send(ChatMessage::new("", "alice", format!("m{i}")))
                .unwrap();
        }

        for rx in [&mut rx_a, &mut rx_b] {
            for i in 0..10 {
                assert_eq!(recv(rx).await.body(), format!("m{i}"));
            }
        }

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_drains_queued_messages() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (_a, mut rx_a) = registered(&registry);
        let (tx, queue) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        tx.send(ChatMessage::new("", "alice", "before shutdown"))
            .unwrap();
        shutdown.cancel();
        spawn(Arc::clone(&registry), queue, shutdown).await.unwrap();

        assert_eq!(recv(&mut rx_a).await.body(), "before shutdown");
        assert!(tx.send(ChatMessage::new("", "alice", "late")).is_err());
    }
}
