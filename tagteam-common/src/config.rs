//! Configuration loading and root folder resolution

use crate::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory name used under the platform config/data directories
const APP_DIR: &str = "tagteam";

/// Logging section shared by every tagteam TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is not set (e.g. "info", "debug")
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Root folder resolution, priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config value
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_value: Option<&Path>,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = toml_value {
        return path.to_path_buf();
    }

    default_root_folder()
}

/// OS-dependent default root folder path
///
/// `~/.local/share/tagteam` on Linux, the platform data dir elsewhere.
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("./tagteam_data"))
}

/// Default location of a module's TOML file (`<config_dir>/tagteam/<module>.toml`)
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join(format!("{module_name}.toml")))
}

/// Load a TOML config file
///
/// A missing file is not an error: the type's defaults are returned.
pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        debug!(path = %path.display(), "Config file absent, using defaults");
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    Ok(config)
}

/// Resolve a possibly-relative path against the root folder
pub fn resolve_in_root(root_folder: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root_folder.join(path)
    }
}

/// Standard User-Agent for outbound HTTP requests
pub fn get_user_agent() -> String {
    format!("tagteam/{} (+https://github.com/tagteam)", env!("CARGO_PKG_VERSION"))
}
