use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::ChatcastConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "chatcast.toml",
    "chatcast.yaml",
    "chatcast.yml",
    "chatcast.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<ChatcastConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./chatcast.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/chatcast/chatcast.{toml,yaml,yml,json}` (user-global)
///
/// Returns `ChatcastConfig::default()` if no config file is found or the
/// one found does not parse.
pub fn discover_and_load() -> ChatcastConfig {
    let mut dirs = vec![PathBuf::from(".")];
    dirs.extend(config_dir());
    discover_in(&dirs)
}

fn discover_in(dirs: &[PathBuf]) -> ChatcastConfig {
    let Some(path) = find_config_file(dirs) else {
        debug!("no config file found, using defaults");
        return ChatcastConfig::default();
    };
    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            ChatcastConfig::default()
        },
    }
}

/// Find the first config file in the given directories.
fn find_config_file(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)))
        .find(|p| p.exists())
}

/// Returns the user-global config directory, `~/.config/chatcast/`.
pub fn config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().join(".config").join("chatcast"))
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<ChatcastConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
