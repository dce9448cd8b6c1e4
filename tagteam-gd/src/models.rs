//! Domain types for tagteam-gd
//!
//! - `MetadataRecord`: the canonical resolved record stored per game id
//! - Catalog payloads (`CatalogEntry`, `CatalogPage`) returned by the bulk app list
//! - Detail payloads (`AppDetails`, `AppCommon`) returned by the per-app info call

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Provider-assigned game identifier (Steam app id)
pub type GameId = u32;

// ============================================================================
// Stored Record
// ============================================================================

/// Resolved metadata for one game
///
/// Written once per id and never partially overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub name: String,
    /// Developer names in provider order
    pub developers: Vec<String>,
    /// Publisher names in provider order
    pub publishers: Vec<String>,
    /// Provider tag ids, most relevant first
    pub tag_ids: Vec<String>,
    /// True when the provider reported a release timestamp or a release state
    pub has_release_date: bool,
    /// e.g. "released", "prerelease"
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "steam_release_state")]
    pub release_state: Option<String>,
    /// Unix seconds; absent or 0 while the game is not yet released
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_timestamp: Option<i64>,
    /// 0-10
    #[serde(default)]
    pub review_score: u8,
    /// 0-100
    #[serde(default)]
    pub review_percentage: u8,
}

impl MetadataRecord {
    /// Release year label used in text responses
    ///
    /// "Unknown" without release info, "Coming Soon" when a release state exists
    /// but no positive timestamp, otherwise the UTC year.
    pub fn release_label(&self) -> String {
        if !self.has_release_date {
            return "Unknown".to_string();
        }
        match self.release_timestamp.filter(|ts| *ts > 0) {
            Some(ts) => DateTime::<Utc>::from_timestamp(ts, 0)
                .map(|dt| dt.year().to_string())
                .unwrap_or_else(|| "Unknown".to_string()),
            None => "Coming Soon".to_string(),
        }
    }
}

// ============================================================================
// Catalog Payloads
// ============================================================================

/// One (identifier, raw name) pair from the bulk catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: GameId,
    pub name: String,
}

/// One page of the bulk catalog
#[derive(Debug, Clone, Default)]
pub struct CatalogPage {
    pub entries: Vec<CatalogEntry>,
    /// Provider signals more pages after this one
    pub have_more: bool,
    /// Continuation cursor for the next request, when the provider sends one
    pub last_id: Option<GameId>,
}

impl CatalogPage {
    /// Cursor for the next page: the provider's cursor, else the last entry seen
    pub fn next_cursor(&self) -> Option<GameId> {
        self.last_id
            .or_else(|| self.entries.last().map(|entry| entry.id))
    }
}

// ============================================================================
// Detail Payloads
// ============================================================================

/// Result of a single-identifier detail request
#[derive(Debug, Clone)]
pub enum AppDetails {
    /// The provider does not know this identifier
    Unknown,
    /// The provider returned an app info document
    Found(AppInfo),
}

/// App info document (only the sections used here)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppInfo {
    #[serde(default)]
    pub common: Option<AppCommon>,
}

/// The "common" section of an app info document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppCommon {
    #[serde(default)]
    pub name: Option<String>,
    /// `{"0": {"type": "developer", "name": "Valve"}, ...}` or an array
    #[serde(default)]
    pub associations: Option<Value>,
    /// `{"0": "1663", "1": "1774"}` or an array
    #[serde(default)]
    pub store_tags: Option<Value>,
    #[serde(default, alias = "release_timestamp", deserialize_with = "lenient_i64")]
    pub steam_release_date: Option<i64>,
    #[serde(default, rename = "releasestate", alias = "release_state", alias = "steam_release_state")]
    pub release_state: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub review_score: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub review_percentage: Option<i64>,
}

/// Values of a numerically-keyed object (or an array) in key order
///
/// Provider collections arrive as `{"0": .., "1": .., "10": ..}`; keys are
/// ordered numerically so `"10"` follows `"9"`.
pub fn ordered_values(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| {
                match (a.parse::<u64>(), b.parse::<u64>()) {
                    (Ok(x), Ok(y)) => x.cmp(&y),
                    (Ok(_), Err(_)) => std::cmp::Ordering::Less,
                    (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
                    (Err(_), Err(_)) => a.cmp(b),
                }
            });
            entries.into_iter().map(|(_, v)| v).collect()
        }
        _ => Vec::new(),
    }
}

/// Scalar as a string (`"1663"` or `1663`)
pub fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Accept a number, a numeric string, an empty string or null
///
/// Unparseable strings become `None` rather than failing the whole document.
fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Value = Deserialize::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    })
}
