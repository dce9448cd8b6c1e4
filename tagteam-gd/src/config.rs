//! Configuration for tagteam-gd
//!
//! Resolution priority: CLI → environment → TOML → compiled defaults.
//! The TOML file (`tagteam-gd.toml`) is optional; every section has defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tagteam_common::config::{resolve_in_root, LoggingConfig};
use tagteam_common::{Error, Result};
use tracing::info;

use crate::store::DataFiles;

/// Environment variable overriding `[provider] api_key`
pub const API_KEY_ENV: &str = "TAGTEAM_STEAM_API_KEY";

/// Whole TOML document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GdConfig {
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub pipeline: PipelineConfig,
    pub files: FilesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// External provider endpoints and request pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Paginated bulk catalog endpoint
    pub catalog_url: String,
    /// Per-app detail endpoint; `{id}` is replaced by the app id
    pub detail_url: String,
    /// Catalog API key
    pub api_key: Option<String>,
    pub requests_per_second: u32,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            catalog_url: "https://api.steampowered.com/IStoreService/GetAppList/v1/".to_string(),
            detail_url: "https://api.steamcmd.net/v1/info/{id}".to_string(),
            api_key: None,
            requests_per_second: 1,
            timeout_secs: 15,
            connect_timeout_secs: 5,
        }
    }
}

/// Fetch cycle tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Catalog page size cap
    pub page_size: u32,
    /// Persist progress after this many ids reach a permanent outcome
    pub checkpoint_period: usize,
    /// Newly resolved records per run; 0 = unlimited
    pub run_budget: usize,
    /// Stop the cycle after this many transient failures in a row; 0 = never
    pub max_consecutive_failures: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            page_size: 10_000,
            checkpoint_period: 100,
            run_budget: 10_000,
            max_consecutive_failures: 25,
        }
    }
}

impl PipelineConfig {
    pub fn run_budget(&self) -> Option<usize> {
        (self.run_budget > 0).then_some(self.run_budget)
    }

    pub fn max_consecutive_failures(&self) -> Option<usize> {
        (self.max_consecutive_failures > 0).then_some(self.max_consecutive_failures)
    }
}

/// Persisted file locations; relative paths resolve against the root folder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    pub index_file: PathBuf,
    pub skip_file: PathBuf,
    pub store_file: PathBuf,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            index_file: PathBuf::from("game_name_to_ids.json"),
            skip_file: PathBuf::from("game_skip_set.json"),
            store_file: PathBuf::from("game_database.json"),
        }
    }
}

impl FilesConfig {
    pub fn data_files(&self, root_folder: &Path) -> DataFiles {
        DataFiles::new(
            resolve_in_root(root_folder, &self.index_file),
            resolve_in_root(root_folder, &self.skip_file),
            resolve_in_root(root_folder, &self.store_file),
        )
    }
}

impl GdConfig {
    /// Apply environment overrides that have no CLI flag
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                info!("Catalog API key loaded from environment variable");
                self.provider.api_key = Some(key);
            }
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.checkpoint_period == 0 {
            return Err(Error::Config("pipeline.checkpoint_period must be > 0".to_string()));
        }
        if self.pipeline.page_size == 0 {
            return Err(Error::Config("pipeline.page_size must be > 0".to_string()));
        }
        if self.provider.requests_per_second == 0 {
            return Err(Error::Config(
                "provider.requests_per_second must be > 0".to_string(),
            ));
        }
        if !self.provider.detail_url.contains("{id}") {
            return Err(Error::Config(format!(
                "provider.detail_url must contain {{id}}: {}",
                self.provider.detail_url
            )));
        }
        Ok(())
    }
}
