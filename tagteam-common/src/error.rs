//! Common error types for tagteam

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for tagteam operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across tagteam services
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted JSON file exists but could not be parsed
    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// In-memory serialization failed (nothing was written)
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
