//! Read-only view of the pipeline results used to answer queries

use crate::models::{GameId, MetadataRecord};
use crate::normalize::normalize_name;
use crate::reconcile::PipelineContext;
use crate::store::{MetadataStore, NameIndex, SkipSet};

#[derive(Debug, Clone, Default)]
pub struct GameSnapshot {
    index: NameIndex,
    store: MetadataStore,
    skip_set: SkipSet,
}

/// Result of an id lookup
#[derive(Debug, PartialEq, Eq)]
pub enum IdLookup<'a> {
    Found(&'a MetadataRecord),
    /// The provider does not know this id
    Unresolvable,
    Missing,
}

impl GameSnapshot {
    pub fn new(index: NameIndex, store: MetadataStore, skip_set: SkipSet) -> Self {
        Self {
            index,
            store,
            skip_set,
        }
    }

    pub fn resolve_by_id(&self, id: GameId) -> IdLookup<'_> {
        if let Some(record) = self.store.get(id) {
            IdLookup::Found(record)
        } else if self.skip_set.contains(id) {
            IdLookup::Unresolvable
        } else {
            IdLookup::Missing
        }
    }

    /// Look up a free-form name after normalizing it
    pub fn resolve_by_name(&self, query: &str) -> Option<&[GameId]> {
        let normalized = normalize_name(query);
        if normalized.is_empty() {
            return None;
        }
        self.index.get(&normalized)
    }

    pub fn record_count(&self) -> usize {
        self.store.len()
    }
}

impl From<PipelineContext> for GameSnapshot {
    fn from(context: PipelineContext) -> Self {
        Self::new(context.index, context.store, context.skip_set)
    }
}
