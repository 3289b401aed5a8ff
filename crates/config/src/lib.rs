//! Configuration loading for the broadcaster.
//!
//! Config files are TOML, YAML or JSON; `${VAR}` placeholders are replaced
//! from the environment before parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{config_dir, discover_and_load, load_config},
    schema::{
        ChatcastConfig, DeliveryConfig, HistoryConfig, HistoryTarget, PersistenceMode,
        ServerConfig, StoreBackend, StoreConfig,
    },
};
