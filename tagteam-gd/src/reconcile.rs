//! Reconciliation Driver
//!
//! Brings the persisted index, skip set and store into a servable state at startup.
//!
//! # States
//! ```text
//! LoadingIndex ──(build fails)──► BlockedRateLimited
//!      │
//! LoadingSkip ──► CheckingStore ──(have >= expected)──► Ready
//!                      │
//!                   Fetching ──(always)──► Ready
//! ```
//! A present but unreadable file ends in `BlockedStorage`.
//!
//! Completion is measured, not flagged: `have = |store| + |skip set|` against
//! `expected` = total ids in the index. A fetch cycle that leaves a shortfall still
//! ends in `Ready`; the next run continues where this one stopped.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::fetcher::{FetchSettings, MetadataFetcher};
use crate::index_builder::NameIndexBuilder;
use crate::provider::{CatalogProvider, DetailProvider};
use crate::store::{repair_overlap, DataFiles, MetadataStore, NameIndex, SkipSet};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Driver state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileState {
    Starting,
    LoadingIndex,
    LoadingSkip,
    CheckingStore,
    Fetching,
    Ready,
    BlockedRateLimited,
    BlockedStorage,
}

impl ReconcileState {
    pub fn is_blocked(self) -> bool {
        matches!(self, Self::BlockedRateLimited | Self::BlockedStorage)
    }
}

/// Why a run could not reach `Ready`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    RateLimited(String),
    Storage(String),
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::RateLimited(msg) => {
                write!(f, "cannot build game list, catalog is rate limited ({msg}); try again later")
            }
            BlockReason::Storage(msg) => write!(f, "persisted state unreadable: {msg}"),
        }
    }
}

/// Everything the query layer needs once the pipeline is ready
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub index: NameIndex,
    pub skip_set: SkipSet,
    pub store: MetadataStore,
    pub expected: usize,
    pub shortfall: usize,
}

#[derive(Debug)]
pub enum ReconcileOutcome {
    Ready(PipelineContext),
    Blocked(BlockReason),
}

/// Progress snapshot published for the status endpoints
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub state: ReconcileState,
    pub expected: usize,
    pub resolved: usize,
    pub skipped: usize,
    pub shortfall: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Default for PipelineStatus {
    fn default() -> Self {
        Self {
            state: ReconcileState::Starting,
            expected: 0,
            resolved: 0,
            skipped: 0,
            shortfall: 0,
            last_error: None,
        }
    }
}

pub type StatusHandle = Arc<RwLock<PipelineStatus>>;

pub struct ReconciliationDriver {
    catalog: Arc<dyn CatalogProvider>,
    details: Arc<dyn DetailProvider>,
    files: DataFiles,
    config: PipelineConfig,
    status: StatusHandle,
    state: ReconcileState,
}

impl ReconciliationDriver {
    pub fn new(
        catalog: Arc<dyn CatalogProvider>,
        details: Arc<dyn DetailProvider>,
        files: DataFiles,
        config: PipelineConfig,
    ) -> Self {
        Self {
            catalog,
            details,
            files,
            config,
            status: Arc::new(RwLock::new(PipelineStatus::default())),
            state: ReconcileState::Starting,
        }
    }

    /// Publish progress into a shared status handle
    pub fn with_status(mut self, status: StatusHandle) -> Self {
        self.status = status;
        self
    }

    pub fn state(&self) -> ReconcileState {
        self.state
    }

    /// Run the state machine to `Ready` or a blocked state
    pub async fn reconcile(&mut self) -> ReconcileOutcome {
        self.transition(ReconcileState::LoadingIndex).await;
        let index = match self.load_or_build_index().await {
            Ok(index) => index,
            Err(PipelineError::RateLimited(msg)) => {
                return self
                    .block(ReconcileState::BlockedRateLimited, BlockReason::RateLimited(msg))
                    .await
            }
            Err(e) => {
                return self
                    .block(ReconcileState::BlockedStorage, BlockReason::Storage(e.to_string()))
                    .await
            }
        };

        self.transition(ReconcileState::LoadingSkip).await;
        let mut skip_set = match self.files.load_skip_set() {
            Ok(skip_set) => skip_set,
            Err(e) => {
                return self
                    .block(ReconcileState::BlockedStorage, BlockReason::Storage(e.to_string()))
                    .await
            }
        };

        self.transition(ReconcileState::CheckingStore).await;
        let mut store = match self.files.load_store() {
            Ok(store) => store,
            Err(e) => {
                return self
                    .block(ReconcileState::BlockedStorage, BlockReason::Storage(e.to_string()))
                    .await
            }
        };
        if repair_overlap(&store, &mut skip_set) > 0 {
            if let Err(e) = self.files.save_skip_set(&skip_set) {
                error!(stage = "skip_set_repair", error = %e, "Failed to persist repaired skip set");
            }
        }

        let expected = index.total_ids();
        let have = store.len() + skip_set.len();
        info!(expected, resolved = store.len(), skipped = skip_set.len(), "Checked store coverage");
        self.publish_counts(expected, &store, &skip_set).await;

        if have < expected {
            self.transition(ReconcileState::Fetching).await;
            info!(missing = expected - have, "Store incomplete, recovering additional games");

            let fetcher = MetadataFetcher::new(
                self.details.as_ref(),
                &self.files,
                FetchSettings::from(&self.config),
            );
            match fetcher.fetch_all(&index, &mut store, &mut skip_set).await {
                Ok(report) if report.shortfall > 0 => warn!(
                    shortfall = report.shortfall,
                    resolved = store.len(),
                    skipped = skip_set.len(),
                    "Incomplete database recovery; rerun to continue download"
                ),
                Ok(_) => info!("All games recovered"),
                Err(e) => {
                    error!(stage = "fetch", error = %e, "Fetch cycle could not start");
                    self.status.write().await.last_error = Some(e.to_string());
                }
            }
            self.publish_counts(expected, &store, &skip_set).await;
        }

        let shortfall = expected.saturating_sub(store.len() + skip_set.len());
        self.transition(ReconcileState::Ready).await;
        ReconcileOutcome::Ready(PipelineContext {
            index,
            skip_set,
            store,
            expected,
            shortfall,
        })
    }

    async fn load_or_build_index(&self) -> Result<NameIndex, PipelineError> {
        if let Some(index) = self.files.load_index()? {
            info!(names = index.len(), ids = index.total_ids(), "Loaded name index");
            return Ok(index);
        }

        info!("Mapping from game names to ids absent, generating");
        let builder = NameIndexBuilder::new(self.catalog.as_ref(), self.config.page_size);
        let index = builder.build_index().await?;

        if let Err(e) = self.files.save_index(&index) {
            error!(
                stage = "index_save",
                path = %self.files.index_path.display(),
                error = %e,
                "Failed to persist name index; continuing with in-memory copy"
            );
        }
        Ok(index)
    }

    async fn transition(&mut self, next: ReconcileState) {
        info!(from = ?self.state, to = ?next, "Reconciliation state change");
        self.state = next;
        self.status.write().await.state = next;
    }

    async fn block(&mut self, state: ReconcileState, reason: BlockReason) -> ReconcileOutcome {
        error!(reason = %reason, "Reconciliation blocked");
        self.transition(state).await;
        self.status.write().await.last_error = Some(reason.to_string());
        ReconcileOutcome::Blocked(reason)
    }

    async fn publish_counts(&self, expected: usize, store: &MetadataStore, skip_set: &SkipSet) {
        let mut status = self.status.write().await;
        status.expected = expected;
        status.resolved = store.len();
        status.skipped = skip_set.len();
        status.shortfall = expected.saturating_sub(store.len() + skip_set.len());
    }
}
