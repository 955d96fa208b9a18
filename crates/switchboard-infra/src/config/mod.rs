//! Configuration loading for Switchboard.
//!
//! Reads `config.toml` and deserializes it into [`SwitchboardConfig`]. The
//! path comes from the `--config` flag, then `SWITCHBOARD_CONFIG`, then
//! `~/.switchboard/config.toml`. A missing file yields defaults; a file
//! that exists but cannot be read or parsed is an error, so a typo never
//! silently routes traffic to the system default backend.

pub mod store;

use std::path::{Path, PathBuf};

use switchboard_types::config::SwitchboardConfig;
use switchboard_types::error::ConfigError;
use switchboard_types::llm::ProviderConfig;

pub use store::TomlConfigStore;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "SWITCHBOARD_CONFIG";
/// Environment variable holding the system default backend's API key.
pub const SYSTEM_API_KEY_ENV: &str = "SWITCHBOARD_SYSTEM_API_KEY";
/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "SWITCHBOARD_DATA_DIR";

const CONFIG_FILE: &str = "config.toml";
const DATA_DIR_NAME: &str = ".switchboard";

/// Data directory: `SWITCHBOARD_DATA_DIR`, else `~/.switchboard`.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV)
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR_NAME)
}

/// Pick the config file path from the flag, the environment, or the default.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    let from_env = std::env::var(CONFIG_PATH_ENV).ok();
    config_path_from(explicit, from_env.as_deref())
}

fn config_path_from(explicit: Option<&Path>, from_env: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match from_env.map(str::trim).filter(|p| !p.is_empty()) {
        Some(path) => PathBuf::from(path),
        None => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE),
    }
}

/// Load configuration from `path`, applying environment overrides.
pub async fn load_config(path: &Path) -> Result<SwitchboardConfig, ConfigError> {
    let config = read_config_file(path).await?;
    let system_key = std::env::var(SYSTEM_API_KEY_ENV).ok();
    Ok(with_system_api_key(config, system_key))
}

async fn read_config_file(path: &Path) -> Result<SwitchboardConfig, ConfigError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(SwitchboardConfig::default());
        }
        Err(err) => {
            return Err(ConfigError::Io {
                path: path.display().to_string(),
                message: err.to_string(),
            });
        }
    };

    let config: SwitchboardConfig = toml::from_str(&content).map_err(|err| ConfigError::Parse {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;

    tracing::debug!(
        path = %path.display(),
        providers = config.providers.len(),
        "Loaded configuration"
    );
    Ok(config)
}

/// Fill the system default's key from the environment when the file has none.
pub fn with_system_api_key(mut config: SwitchboardConfig, key: Option<String>) -> SwitchboardConfig {
    if config.system_default.api_key.trim().is_empty()
        && let Some(key) = key.filter(|k| !k.trim().is_empty())
    {
        config.system_default.api_key = key;
    }
    config
}

/// The system default backend, if its entry is valid.
///
/// An entry without credentials is still returned; the resolver decides
/// whether it is usable.
pub fn system_default_config(config: &SwitchboardConfig) -> Option<ProviderConfig> {
    match config.system_default.to_config() {
        Ok(resolved) => Some(resolved),
        Err(err) => {
            tracing::warn!(error = %err, "Ignoring invalid system default provider");
            None
        }
    }
}
