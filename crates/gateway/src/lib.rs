//! Gateway: WebSocket fan-out of chat messages to every live connection.
//!
//! Lifecycle of a connection:
//! 1. `/ws` upgrade, [`hub::Hub::connect`] registers the connection
//! 2. history replay runs as its own task
//! 3. the reader decodes, persists and submits inbound frames
//! 4. the dispatcher writes each submitted message to every registered
//!    connection through that connection's outbound queue
//! 5. the first read or write failure closes and deregisters it
//!
//! HTTP plumbing (static files, health) lives in `server.rs`.

pub mod connection;
pub mod dispatcher;
pub mod hub;
pub mod reader;
pub mod registry;
pub mod replay;
pub mod server;
pub mod ws;

pub use {
    connection::{ConnectionHandle, DeliveryError, Frame},
    hub::{Hub, HubClosed, HubSettings},
    registry::{ConnectionRegistry, Liveness},
};
