//! Error types for tagteam-gd
//!
//! - `ProviderError`: a single request to the external catalog failed
//! - `PipelineError`: a reconciliation stage could not complete

use thiserror::Error;

/// Failure of one request against the external provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Connection, timeout or transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Provider answered with an empty body (typically throttling)
    #[error("Empty payload from provider")]
    EmptyPayload,

    /// Session could not be established
    #[error("Connect error: {0}")]
    Connect(String),
}

impl ProviderError {
    /// The provider itself failed to answer (throttling, outage, transport)
    ///
    /// A `Parse` error means the provider answered; it says nothing about
    /// whether the next request will succeed.
    pub fn is_unavailability(&self) -> bool {
        matches!(
            self,
            ProviderError::Network(_)
                | ProviderError::Api { .. }
                | ProviderError::EmptyPayload
                | ProviderError::Connect(_)
        )
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Parse(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

/// Stage-level pipeline failure
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bulk catalog unavailable; no partial index is kept
    #[error("Catalog rate limited: {0}")]
    RateLimited(String),

    /// Persisted state could not be read or written
    #[error("Storage error: {0}")]
    Storage(#[from] tagteam_common::Error),

    /// Detail session could not be opened
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Result type for pipeline stages
pub type PipelineResult<T> = Result<T, PipelineError>;
