//! tagteam-gd library - game data service
//!
//! Builds a name → id index from the provider catalog, resolves per-game
//! metadata with resumable checkpoints, and answers text queries once ready.

pub mod api;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod index_builder;
pub mod models;
pub mod normalize;
pub mod provider;
pub mod reconcile;
pub mod snapshot;
pub mod store;

pub use crate::error::{PipelineError, PipelineResult, ProviderError};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::reconcile::{PipelineContext, PipelineStatus, StatusHandle};
use crate::snapshot::GameSnapshot;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Published once the pipeline reaches Ready; `None` until then
    snapshot: Arc<RwLock<Option<Arc<GameSnapshot>>>>,
    /// Reconciliation progress, written by the pipeline task
    pub status: StatusHandle,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(None)),
            status: Arc::new(RwLock::new(PipelineStatus::default())),
            startup_time: Utc::now(),
        }
    }

    /// Hand the pipeline results to the query layer
    pub async fn mark_ready(&self, context: PipelineContext) {
        let snapshot = GameSnapshot::from(context);
        tracing::info!(records = snapshot.record_count(), "Query server ready");
        *self.snapshot.write().await = Some(Arc::new(snapshot));
    }

    pub async fn snapshot(&self) -> Option<Arc<GameSnapshot>> {
        self.snapshot.read().await.clone()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Build application router
///
/// `/health` and `/status` are JSON; every other path speaks the text protocol.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .fallback(api::handle_query)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
