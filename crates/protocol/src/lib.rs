//! Wire protocol shared by the broadcaster and its clients.
//!
//! Clients and server exchange one JSON object per WebSocket frame:
//!
//! ```json
//! {"email": "a@x.com", "username": "alice", "message": "hi"}
//! ```
//!
//! The same shape flows in both directions; the server rebroadcasts the
//! frame it decoded without adding fields.

use serde::{Deserialize, Serialize};

/// Path of the WebSocket upgrade endpoint.
pub const WS_PATH: &str = "/ws";

/// Port the broadcaster listens on when nothing else is configured.
pub const DEFAULT_PORT: u16 = 8000;

/// Number of stored messages replayed to a new connection by default.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

// ── Message ──────────────────────────────────────────────────────────────────

/// A single chat message.
///
/// Fields are private so a decoded message cannot be altered between
/// persistence and fan-out; both receive the same value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "email")]
    sender_email: String,
    username: String,
    #[serde(rename = "message")]
    body: String,
}

/// Failure to turn a frame payload into a [`ChatMessage`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed chat frame: {0}")]
    Json(#[from] serde_json::Error),
}

impl ChatMessage {
    pub fn new(
        sender_email: impl Into<String>,
        username: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            sender_email: sender_email.into(),
            username: username.into(),
            body: body.into(),
        }
    }

    pub fn sender_email(&self) -> &str {
        &self.sender_email
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Decode a binary frame carrying UTF-8 JSON.
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encode to the outbound wire form.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn decodes_wire_field_names() {
        let msg =
            ChatMessage::decode(r#"{"email":"a@x.com","username":"alice","message":"hi"}"#)
                .unwrap();
        assert_eq!(msg.sender_email(), "a@x.com");
        assert_eq!(msg.username(), "alice");
        assert_eq!(msg.body(), "hi");
    }

    #[test]
    fn encodes_wire_field_names() {
        let encoded = ChatMessage::new("a@x.com", "alice", "hi").encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"email": "a@x.com", "username": "alice", "message": "hi"})
        );
    }

    #[test]
    fn rejects_missing_field() {
        let err = ChatMessage::decode(r#"{"email":"a@x.com","username":"alice"}"#).unwrap_err();
        assert!(err.to_string().contains("message"));
    }

    #[test]
    fn rejects_non_json() {
        assert!(ChatMessage::decode("hello there").is_err());
        assert!(ChatMessage::decode_bytes(&[0xff, 0x00]).is_err());
    }

    #[test]
    fn binary_frames_decode_like_text() {
        let msg = ChatMessage::decode_bytes(br#"{"email":"","username":"bob","message":"yo"}"#)
            .unwrap();
        assert_eq!(msg, ChatMessage::new("", "bob", "yo"));
    }

    #[test]
    fn ignores_unknown_fields() {
        let msg = ChatMessage::decode(
            r#"{"email":"a@x.com","username":"alice","message":"hi","room":"general"}"#,
        )
        .unwrap();
        assert_eq!(msg.body(), "hi");
    }
}
