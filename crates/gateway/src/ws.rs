//! WebSocket session: one reader (the caller's task) and one writer task
//! per upgraded socket.

use std::{fmt::Display, net::SocketAddr, sync::Arc, time::Duration};

use {
    axum::extract::ws::{Message, WebSocket},
    futures::{Sink, SinkExt, StreamExt},
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

use crate::{
    connection::{ConnectionHandle, Frame},
    hub::Hub,
    reader::run_reader,
};

/// Drive an upgraded socket until either direction fails.
pub async fn handle_connection(socket: WebSocket, hub: Arc<Hub>, remote: SocketAddr) {
    let (conn, outbound) = match hub.connect(Some(remote)) {
        Ok(pair) => pair,
        Err(e) => {
            debug!(remote = %remote, error = %e, "rejecting connection");
            return;
        },
    };

    let (sink, stream) = socket.split();
    let writer = tokio::spawn(write_loop(
        sink,
        outbound,
        conn.clone(),
        hub.settings().send_timeout,
    ));

    run_reader(&hub, &conn, stream).await;

    if let Err(e) = writer.await {
        warn!(conn_id = conn.conn_id(), error = %e, "writer task failed");
    }
    info!(
        conn_id = conn.conn_id(),
        remote = %remote,
        connections = hub.connection_count(),
        "client disconnected"
    );
}

/// Sole writer for one socket: drains the outbound queue, bounding every
/// write by `send_timeout`.
///
/// A failed or timed-out write closes the connection. Once the connection
/// is closed a single close frame is sent and the sink is dropped.
pub async fn write_loop<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<Frame>,
    conn: ConnectionHandle,
    send_timeout: Duration,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = conn.closed() => None,
            frame = outbound.recv() => frame,
        };
        let Some(frame) = next else { break };

        let write = sink.send(Message::Text(frame.to_string().into()));
        match tokio::time::timeout(send_timeout, write).await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => {
                warn!(conn_id = conn.conn_id(), error = %e, "socket write failed");
                break;
            },
            Err(_) => {
                warn!(
                    conn_id = conn.conn_id(),
                    timeout_ms = send_timeout.as_millis() as u64,
                    "socket write timed out"
                );
                break;
            },
        }
    }

    conn.close();
    outbound.close();
    // Best effort; the peer may already be gone.
    if let Ok(Err(e)) = tokio::time::timeout(send_timeout, sink.send(Message::Close(None))).await
    {
        debug!(conn_id = conn.conn_id(), error = %e, "close frame not delivered");
    }
}
