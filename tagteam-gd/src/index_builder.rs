//! Name index construction from the bulk catalog
//!
//! Pages through the whole catalog, filters raw names and groups ids by
//! normalized name in catalog order. Any failing page aborts the build: a
//! partially fetched catalog is never indexed.

use crate::error::{PipelineError, PipelineResult};
use crate::models::{CatalogEntry, GameId};
use crate::normalize::{keep_catalog_name, normalize_name};
use crate::provider::CatalogProvider;
use crate::store::NameIndex;
use tracing::{debug, info, warn};

pub struct NameIndexBuilder<'a> {
    provider: &'a dyn CatalogProvider,
    page_size: u32,
}

impl<'a> NameIndexBuilder<'a> {
    pub fn new(provider: &'a dyn CatalogProvider, page_size: u32) -> Self {
        Self {
            provider,
            page_size,
        }
    }

    /// Fetch every catalog page and build the index
    ///
    /// # Errors
    /// `PipelineError::RateLimited` on any fetch or parse failure, on an empty
    /// catalog, or when the provider keeps reporting more pages without
    /// advancing its cursor.
    pub async fn build_index(&self) -> PipelineResult<NameIndex> {
        let entries = self.fetch_catalog().await?;
        let index = index_entries(&entries);

        info!(
            catalog_entries = entries.len(),
            names = index.len(),
            ids = index.total_ids(),
            "Built name index"
        );
        Ok(index)
    }

    async fn fetch_catalog(&self) -> PipelineResult<Vec<CatalogEntry>> {
        let mut entries = Vec::new();
        let mut cursor: Option<GameId> = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .provider
                .fetch_page(cursor, self.page_size)
                .await
                .map_err(|e| {
                    warn!(stage = "catalog_fetch", page = pages, error = %e, "Catalog page failed");
                    PipelineError::RateLimited(e.to_string())
                })?;
            pages += 1;

            let next = page.next_cursor();
            debug!(page = pages, entries = page.entries.len(), have_more = page.have_more, "Catalog page received");
            entries.extend(page.entries);

            if !page.have_more {
                break;
            }
            if next.is_none() || next == cursor {
                return Err(PipelineError::RateLimited(format!(
                    "catalog cursor did not advance after page {pages}"
                )));
            }
            cursor = next;
        }

        if entries.is_empty() {
            return Err(PipelineError::RateLimited(
                "catalog returned no entries".to_string(),
            ));
        }
        Ok(entries)
    }
}

/// Filter and group catalog entries in encounter order
pub fn index_entries(entries: &[CatalogEntry]) -> NameIndex {
    let mut index = NameIndex::new();
    for entry in entries {
        if !keep_catalog_name(&entry.name) {
            continue;
        }
        index.push(normalize_name(&entry.name), entry.id);
    }
    index
}
