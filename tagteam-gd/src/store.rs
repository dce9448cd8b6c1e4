//! Persisted pipeline state
//!
//! Three independent JSON files:
//! - name index: normalized name → ids, in catalog order
//! - skip set: ids that can never be resolved
//! - metadata store: id → `MetadataRecord`
//!
//! Each file is rewritten whole through `tagteam_common::json_file`, so an
//! interrupted write leaves the previous version in place.

use crate::models::{GameId, MetadataRecord};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use tagteam_common::json_file::{load_json, save_json};
use tagteam_common::Result;
use tracing::{info, warn};

// ============================================================================
// Name Index
// ============================================================================

/// Normalized name → ids, preserving first-insertion order of names
///
/// Key order drives the fetch order and the first id of a list wins ambiguous
/// lookups, so both orders survive a save/load cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NameIndex {
    entries: Vec<(String, Vec<GameId>)>,
    positions: HashMap<String, usize>,
}

impl NameIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `id` under `normalized`, creating the entry on first sight
    pub fn push(&mut self, normalized: String, id: GameId) {
        match self.positions.get(&normalized) {
            Some(&pos) => self.entries[pos].1.push(id),
            None => {
                self.positions.insert(normalized.clone(), self.entries.len());
                self.entries.push((normalized, vec![id]));
            }
        }
    }

    /// Ids for an already-normalized name
    pub fn get(&self, normalized: &str) -> Option<&[GameId]> {
        self.positions
            .get(normalized)
            .map(|&pos| self.entries[pos].1.as_slice())
    }

    /// Number of distinct names
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total ids across all names (the expected number of games)
    pub fn total_ids(&self) -> usize {
        self.entries.iter().map(|(_, ids)| ids.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[GameId])> + '_ {
        self.entries
            .iter()
            .map(|(name, ids)| (name.as_str(), ids.as_slice()))
    }

    /// Every id in walk order: name order, then list order within a name
    pub fn ids(&self) -> impl Iterator<Item = GameId> + '_ {
        self.entries.iter().flat_map(|(_, ids)| ids.iter().copied())
    }
}

impl Serialize for NameIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, ids) in &self.entries {
            map.serialize_entry(name, ids)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for NameIndex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct NameIndexVisitor;

        impl<'de> Visitor<'de> for NameIndexVisitor {
            type Value = NameIndex;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of normalized names to id lists")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<NameIndex, A::Error> {
                let mut index = NameIndex::new();
                while let Some((name, ids)) = access.next_entry::<String, Vec<GameId>>()? {
                    for id in ids {
                        index.push(name.clone(), id);
                    }
                }
                Ok(index)
            }
        }

        deserializer.deserialize_map(NameIndexVisitor)
    }
}

// ============================================================================
// Skip Set
// ============================================================================

/// Ids known to be permanently unresolvable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkipSet(BTreeSet<GameId>);

impl SkipSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: GameId) -> bool {
        self.0.contains(&id)
    }

    /// Returns false if the id was already present
    pub fn insert(&mut self, id: GameId) -> bool {
        self.0.insert(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = GameId> + '_ {
        self.0.iter().copied()
    }

    fn remove(&mut self, id: GameId) -> bool {
        self.0.remove(&id)
    }
}

// ============================================================================
// Metadata Store
// ============================================================================

/// Id → resolved record; records are never overwritten
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataStore(BTreeMap<GameId, MetadataRecord>);

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: GameId) -> Option<&MetadataRecord> {
        self.0.get(&id)
    }

    pub fn contains(&self, id: GameId) -> bool {
        self.0.contains_key(&id)
    }

    /// Insert a record unless one already exists for `id`
    pub fn insert_new(&mut self, id: GameId, record: MetadataRecord) -> bool {
        match self.0.entry(id) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    /// Merge a batch of newly resolved records; returns how many were new
    pub fn merge(&mut self, delta: &mut BTreeMap<GameId, MetadataRecord>) -> usize {
        let mut inserted = 0;
        for (id, record) in std::mem::take(delta) {
            if self.insert_new(id, record) {
                inserted += 1;
            }
        }
        inserted
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = GameId> + '_ {
        self.0.keys().copied()
    }
}

/// Drop ids present in both store and skip set from the skip set
///
/// The two are disjoint by construction; an overlap only appears after manual
/// edits of the files. The resolved record wins.
pub fn repair_overlap(store: &MetadataStore, skip_set: &mut SkipSet) -> usize {
    let overlapping: Vec<GameId> = skip_set.iter().filter(|id| store.contains(*id)).collect();
    for id in &overlapping {
        skip_set.remove(*id);
    }
    if !overlapping.is_empty() {
        warn!(count = overlapping.len(), "Removed ids present in both store and skip set");
    }
    overlapping.len()
}

// ============================================================================
// File Layout
// ============================================================================

/// Locations of the three persisted structures
#[derive(Debug, Clone)]
pub struct DataFiles {
    pub index_path: PathBuf,
    pub skip_path: PathBuf,
    pub store_path: PathBuf,
}

impl DataFiles {
    pub fn new(index_path: PathBuf, skip_path: PathBuf, store_path: PathBuf) -> Self {
        Self {
            index_path,
            skip_path,
            store_path,
        }
    }

    /// Default file names inside one directory
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(
            dir.join("game_name_to_ids.json"),
            dir.join("game_skip_set.json"),
            dir.join("game_database.json"),
        )
    }

    /// `None` when the index has not been built yet
    pub fn load_index(&self) -> Result<Option<NameIndex>> {
        load_json(&self.index_path)
    }

    pub fn save_index(&self, index: &NameIndex) -> Result<()> {
        save_json(&self.index_path, index)
    }

    /// Empty when absent
    pub fn load_skip_set(&self) -> Result<SkipSet> {
        Ok(load_json(&self.skip_path)?.unwrap_or_default())
    }

    pub fn save_skip_set(&self, skip_set: &SkipSet) -> Result<()> {
        save_json(&self.skip_path, skip_set)
    }

    /// Empty when absent
    ///
    /// Entries that are not in the canonical record shape are dropped so the
    /// next fetch cycle resolves them again.
    pub fn load_store(&self) -> Result<MetadataStore> {
        let raw: BTreeMap<GameId, Value> = match load_json(&self.store_path)? {
            Some(raw) => raw,
            None => return Ok(MetadataStore::new()),
        };

        let total = raw.len();
        let mut store = MetadataStore::new();
        for (id, value) in raw {
            if let Ok(record) = serde_json::from_value::<MetadataRecord>(value) {
                store.insert_new(id, record);
            }
        }

        let discarded = total - store.len();
        if discarded > 0 {
            warn!(
                discarded,
                path = %self.store_path.display(),
                "Discarded stored records not in the current schema; they will be refetched"
            );
        }
        info!(records = store.len(), "Loaded metadata store");
        Ok(store)
    }

    pub fn save_store(&self, store: &MetadataStore) -> Result<()> {
        save_json(&self.store_path, store)
    }
}
