//! Durable record of chat messages, queryable by recency.

pub mod memory;
pub mod sqlite;
pub mod store;

use std::sync::Arc;

use chatcast_config::{StoreBackend, StoreConfig};

pub use {memory::MemoryMessageStore, sqlite::SqliteMessageStore, store::MessageStore};

/// Open the store selected by `config`.
pub async fn open_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn MessageStore>> {
    match config.backend {
        StoreBackend::Sqlite => Ok(Arc::new(SqliteMessageStore::connect(&config.path).await?)),
        StoreBackend::Memory => Ok(Arc::new(MemoryMessageStore::new())),
    }
}
