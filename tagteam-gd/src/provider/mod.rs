//! External catalog providers
//!
//! Two seams, both awaited one request at a time:
//! - `CatalogProvider`: paginated bulk list of (id, raw name)
//! - `DetailProvider`: opens a `DetailSession` that answers one id per request
//!
//! `steam` holds the HTTP implementation; tests substitute in-memory fakes.

pub mod steam;

use crate::error::ProviderError;
use crate::models::{AppDetails, CatalogPage, GameId};
use async_trait::async_trait;

pub use steam::{SteamCatalogClient, SteamDetailClient};

/// Paginated bulk catalog
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Fetch the page following `cursor` (the last id seen, `None` for the first page)
    async fn fetch_page(
        &self,
        cursor: Option<GameId>,
        max_results: u32,
    ) -> Result<CatalogPage, ProviderError>;
}

/// Source of per-identifier detail sessions
#[async_trait]
pub trait DetailProvider: Send + Sync {
    /// Establish an anonymous session
    async fn connect(&self) -> Result<Box<dyn DetailSession>, ProviderError>;
}

/// An open detail session
#[async_trait]
pub trait DetailSession: Send {
    /// Request detailed info for a single identifier
    async fn app_details(&mut self, id: GameId) -> Result<AppDetails, ProviderError>;

    /// Close the session
    async fn disconnect(self: Box<Self>);
}
