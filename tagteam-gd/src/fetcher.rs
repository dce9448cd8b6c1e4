//! Metadata Fetcher
//!
//! Resolves ids from the name index into `MetadataRecord`s, one provider request
//! at a time, and checkpoints progress to disk.
//!
//! # Outcomes per id
//! - **Resolved**: record extracted, buffered in a delta batch
//! - **Unresolvable**: provider says unknown, or the record has no name → skip set
//! - **Transient**: any other failure → logged, left for a later run
//!
//! # Checkpoints
//! Every `checkpoint_period` permanent outcomes the delta batch is merged into the
//! store and both the store and the skip set are persisted. A crash loses at most
//! one period of work. The final merge happens whatever stopped the cycle.

use crate::config::PipelineConfig;
use crate::error::{PipelineResult, ProviderError};
use crate::models::{ordered_values, scalar_string, AppCommon, AppDetails, GameId, MetadataRecord};
use crate::provider::{DetailProvider, DetailSession};
use crate::store::{DataFiles, MetadataStore, NameIndex, SkipSet};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// Fetch cycle limits
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Permanent outcomes between checkpoints (must be > 0)
    pub checkpoint_period: usize,
    /// Stop after this many newly resolved records
    pub run_budget: Option<usize>,
    /// Stop after this many transient failures in a row
    pub max_consecutive_failures: Option<usize>,
}

impl From<&PipelineConfig> for FetchSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            checkpoint_period: config.checkpoint_period.max(1),
            run_budget: config.run_budget(),
            max_consecutive_failures: config.max_consecutive_failures(),
        }
    }
}

/// Why a fetch cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every pending id was attempted
    Exhausted,
    /// The per-run budget of newly resolved records was reached
    BudgetReached,
    /// Too many consecutive transient failures
    ProviderUnavailable,
}

/// Summary of one fetch cycle
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub attempted: usize,
    pub resolved: usize,
    pub skipped: usize,
    pub failed: usize,
    pub checkpoints: usize,
    /// Ids still neither resolved nor skipped
    pub shortfall: usize,
    pub stop_reason: StopReason,
}

/// Classified result of one detail request
#[derive(Debug)]
pub enum DetailOutcome {
    Resolved(MetadataRecord),
    Unresolvable(&'static str),
    Transient(ProviderError),
}

impl From<Result<AppDetails, ProviderError>> for DetailOutcome {
    fn from(result: Result<AppDetails, ProviderError>) -> Self {
        match result {
            Ok(AppDetails::Unknown) => DetailOutcome::Unresolvable("unknown identifier"),
            Ok(AppDetails::Found(info)) => match info.common.as_ref().and_then(extract_record) {
                Some(record) => DetailOutcome::Resolved(record),
                None => DetailOutcome::Unresolvable("record has no name"),
            },
            Err(e) => DetailOutcome::Transient(e),
        }
    }
}

/// Build the canonical record from an app's common section
///
/// Returns `None` when the name is missing or blank.
pub fn extract_record(common: &AppCommon) -> Option<MetadataRecord> {
    let name = common.name.as_deref().map(str::trim).filter(|n| !n.is_empty())?;

    let mut developers = Vec::new();
    let mut publishers = Vec::new();
    if let Some(associations) = &common.associations {
        for association in ordered_values(associations) {
            let role = association.get("type").and_then(Value::as_str);
            let Some(who) = association.get("name").and_then(Value::as_str) else {
                continue;
            };
            match role {
                Some("developer") => developers.push(who.to_string()),
                Some("publisher") => publishers.push(who.to_string()),
                _ => {}
            }
        }
    }

    let tag_ids = common
        .store_tags
        .as_ref()
        .map(|tags| ordered_values(tags).into_iter().filter_map(scalar_string).collect())
        .unwrap_or_default();

    let release_state = common.release_state.clone().filter(|s| !s.is_empty());
    let release_timestamp = common.steam_release_date;

    Some(MetadataRecord {
        name: name.to_string(),
        developers,
        publishers,
        tag_ids,
        has_release_date: release_timestamp.is_some() || release_state.is_some(),
        release_state,
        release_timestamp,
        review_score: common.review_score.unwrap_or(0).clamp(0, 10) as u8,
        review_percentage: common.review_percentage.unwrap_or(0).clamp(0, 100) as u8,
    })
}

/// Per-cycle mutable state
#[derive(Default)]
struct Progress {
    delta: BTreeMap<GameId, MetadataRecord>,
    since_checkpoint: usize,
    attempted: usize,
    resolved: usize,
    skipped: usize,
    failed: usize,
    consecutive_failures: usize,
    checkpoints: usize,
}

pub struct MetadataFetcher<'a> {
    provider: &'a dyn DetailProvider,
    files: &'a DataFiles,
    settings: FetchSettings,
}

impl<'a> MetadataFetcher<'a> {
    pub fn new(provider: &'a dyn DetailProvider, files: &'a DataFiles, settings: FetchSettings) -> Self {
        Self {
            provider,
            files,
            settings,
        }
    }

    /// Resolve every id of `index` not yet in `store` or `skip_set`
    ///
    /// Ids are attempted in index walk order. `store` and `skip_set` are updated
    /// in place and persisted at each checkpoint and at the end.
    ///
    /// # Errors
    /// Only when the detail session cannot be opened; nothing is changed then.
    pub async fn fetch_all(
        &self,
        index: &NameIndex,
        store: &mut MetadataStore,
        skip_set: &mut SkipSet,
    ) -> PipelineResult<FetchReport> {
        let mut session = self.provider.connect().await?;
        info!(
            pending = index.total_ids().saturating_sub(store.len() + skip_set.len()),
            checkpoint_period = self.settings.checkpoint_period,
            run_budget = ?self.settings.run_budget,
            "Detail session opened, fetching metadata"
        );

        let mut progress = Progress::default();
        let stop_reason = self
            .run_cycle(session.as_mut(), index, store, skip_set, &mut progress)
            .await;

        session.disconnect().await;
        if !progress.delta.is_empty() || progress.since_checkpoint > 0 {
            self.checkpoint(store, skip_set, &mut progress);
        }

        let shortfall = index.total_ids().saturating_sub(store.len() + skip_set.len());
        let report = FetchReport {
            attempted: progress.attempted,
            resolved: progress.resolved,
            skipped: progress.skipped,
            failed: progress.failed,
            checkpoints: progress.checkpoints,
            shortfall,
            stop_reason,
        };
        info!(
            attempted = report.attempted,
            resolved = report.resolved,
            skipped = report.skipped,
            failed = report.failed,
            checkpoints = report.checkpoints,
            stop_reason = ?report.stop_reason,
            "Fetch cycle finished"
        );
        Ok(report)
    }

    async fn run_cycle(
        &self,
        session: &mut dyn DetailSession,
        index: &NameIndex,
        store: &mut MetadataStore,
        skip_set: &mut SkipSet,
        progress: &mut Progress,
    ) -> StopReason {
        for id in index.ids() {
            if store.contains(id) || skip_set.contains(id) || progress.delta.contains_key(&id) {
                continue;
            }

            if let Some(budget) = self.settings.run_budget {
                if progress.resolved >= budget {
                    info!(budget, "Run budget reached, stopping early");
                    return StopReason::BudgetReached;
                }
            }

            progress.attempted += 1;
            match DetailOutcome::from(session.app_details(id).await) {
                DetailOutcome::Resolved(record) => {
                    debug!(game_id = id, name = %record.name, "Resolved");
                    progress.delta.insert(id, record);
                    progress.resolved += 1;
                    progress.since_checkpoint += 1;
                    progress.consecutive_failures = 0;
                }
                DetailOutcome::Unresolvable(reason) => {
                    debug!(game_id = id, reason, "Unresolvable, adding to skip set");
                    skip_set.insert(id);
                    progress.skipped += 1;
                    progress.since_checkpoint += 1;
                    progress.consecutive_failures = 0;
                }
                DetailOutcome::Transient(e) => {
                    warn!(game_id = id, stage = "detail_fetch", error = %e, "Fetch failed, will retry next run");
                    progress.failed += 1;
                    if !e.is_unavailability() {
                        // Malformed answer for this id only; the provider is up
                        progress.consecutive_failures = 0;
                    } else {
                        progress.consecutive_failures += 1;
                        if let Some(limit) = self.settings.max_consecutive_failures {
                            if progress.consecutive_failures >= limit {
                                warn!(
                                    consecutive_failures = progress.consecutive_failures,
                                    "Provider stopped responding, ending fetch cycle"
                                );
                                return StopReason::ProviderUnavailable;
                            }
                        }
                    }
                }
            }

            if progress.since_checkpoint >= self.settings.checkpoint_period {
                self.checkpoint(store, skip_set, progress);
            }
        }
        StopReason::Exhausted
    }

    /// Merge the delta batch and persist store and skip set
    ///
    /// A failed write is logged; the previous file stays intact and the next
    /// checkpoint writes the full state again.
    fn checkpoint(&self, store: &mut MetadataStore, skip_set: &SkipSet, progress: &mut Progress) {
        let merged = store.merge(&mut progress.delta);
        progress.since_checkpoint = 0;
        progress.checkpoints += 1;

        if let Err(e) = self.files.save_store(store) {
            error!(stage = "checkpoint", path = %self.files.store_path.display(), error = %e, "Failed to persist metadata store");
        }
        if let Err(e) = self.files.save_skip_set(skip_set) {
            error!(stage = "checkpoint", path = %self.files.skip_path.display(), error = %e, "Failed to persist skip set");
        }
        debug!(
            merged,
            records = store.len(),
            skipped = skip_set.len(),
            "Checkpoint written"
        );
    }
}
