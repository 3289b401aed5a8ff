//! Per-connection read loop.

use std::fmt::Display;

use {
    axum::extract::ws::Message,
    chatcast_config::PersistenceMode,
    futures::{Stream, StreamExt},
    tracing::{debug, warn},
};

use chatcast_protocol::ChatMessage;

use crate::{connection::ConnectionHandle, hub::Hub};

/// Deregisters and closes the connection however the reader exits.
struct ReaderGuard<'a> {
    hub: &'a Hub,
    conn: &'a ConnectionHandle,
}

impl Drop for ReaderGuard<'_> {
    fn drop(&mut self) {
        self.hub.disconnect(self.conn.conn_id());
        self.conn.close();
    }
}

/// Read frames from `incoming` until the first failure, persisting and
/// broadcasting every decoded message.
///
/// Stream end, a close frame, a transport error, an undecodable payload or
/// the connection being closed elsewhere all end the loop.
pub async fn run_reader<S, E>(hub: &Hub, conn: &ConnectionHandle, mut incoming: S)
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let _guard = ReaderGuard { hub, conn };

    loop {
        let next = tokio::select! {
            _ = conn.closed() => None,
            next = incoming.next() => next,
        };

        let decoded = match next {
            Some(Ok(Message::Text(text))) => ChatMessage::decode(text.as_str()),
            Some(Ok(Message::Binary(bytes))) => ChatMessage::decode_bytes(&bytes),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) => {
                debug!(conn_id = conn.conn_id(), "client sent close frame");
                break;
            },
            Some(Err(e)) => {
                debug!(conn_id = conn.conn_id(), error = %e, "read failed");
                break;
            },
            None => break,
        };

        let message = match decoded {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    conn_id = conn.conn_id(),
                    error = %e,
                    "undecodable frame, dropping connection"
                );
                break;
            },
        };

        if !persist(hub, conn, &message).await {
            continue;
        }

        if hub.submit(message).is_err() {
            debug!(conn_id = conn.conn_id(), "hub shut down, stopping reader");
            break;
        }
    }
}

/// Append to the store. Returns whether the message should be broadcast.
async fn persist(hub: &Hub, conn: &ConnectionHandle, message: &ChatMessage) -> bool {
    let Err(e) = hub.store().append(message).await else {
        return true;
    };
    match hub.settings().persistence {
        PersistenceMode::BestEffort => {
            warn!(
                conn_id = conn.conn_id(),
                error = %e,
                "failed to persist message, broadcasting anyway"
            );
            true
        },
        PersistenceMode::PersistFirst => {
            warn!(
                conn_id = conn.conn_id(),
                error = %e,
                "failed to persist message, not broadcasting"
            );
            false
        },
    }
}
