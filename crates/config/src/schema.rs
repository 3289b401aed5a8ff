//! Config schema types (server, store, history, delivery).

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use chatcast_protocol::{DEFAULT_HISTORY_LIMIT, DEFAULT_PORT};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatcastConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub history: HistoryConfig,
    pub delivery: DeliveryConfig,
}

/// HTTP listener and static asset settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Directory served for every path other than the upgrade endpoint.
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            static_dir: PathBuf::from("public"),
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Message store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Path to the SQLite database file (or `:memory:`).
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            path: "chat.db".into(),
        }
    }
}

/// Who receives stored history when a client connects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryTarget {
    /// Only the connection that just joined.
    #[default]
    Joiner,
    /// Every live connection, including ones that already saw it.
    Everyone,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Number of stored messages replayed on connect. Zero disables replay.
    pub limit: usize,
    pub target: HistoryTarget,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_HISTORY_LIMIT,
            target: HistoryTarget::Joiner,
        }
    }
}

/// How a received message relates to its persistence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceMode {
    /// Broadcast even when the store rejects the message.
    #[default]
    BestEffort,
    /// Broadcast only messages the store accepted.
    PersistFirst,
}

/// Outbound delivery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub persistence: PersistenceMode,
    /// Frames queued per connection before it counts as a failed write.
    pub outbound_buffer: usize,
    /// Upper bound on a single socket write.
    pub send_timeout_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            persistence: PersistenceMode::BestEffort,
            outbound_buffer: 256,
            send_timeout_ms: 5_000,
        }
    }
}

impl DeliveryConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_listener() {
        let cfg = ChatcastConfig::default();
        assert_eq!(cfg.server.listen_addr(), "0.0.0.0:8000");
        assert_eq!(cfg.history.limit, 50);
        assert_eq!(cfg.history.target, HistoryTarget::Joiner);
        assert_eq!(cfg.delivery.persistence, PersistenceMode::BestEffort);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let cfg: ChatcastConfig = toml::from_str(
            r#"
            [history]
            target = "everyone"

            [delivery]
            persistence = "persist_first"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.history.target, HistoryTarget::Everyone);
        assert_eq!(cfg.history.limit, 50);
        assert_eq!(cfg.delivery.persistence, PersistenceMode::PersistFirst);
        assert_eq!(cfg.delivery.outbound_buffer, 256);
        assert_eq!(cfg.store, StoreConfig::default());
    }

    #[test]
    fn rejects_unknown_enum_value() {
        let res: Result<ChatcastConfig, _> = toml::from_str("[store]\nbackend = \"mongo\"\n");
        assert!(res.is_err());
    }
}
