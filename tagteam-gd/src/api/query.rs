//! Text query protocol
//!
//! `GET /?game_info=440?game_name_search=Team%20Fortress%202`
//!
//! Clauses are separated by `?` or `&` and split on their first `=`. Each clause
//! produces one line, in request order. Until the pipeline is ready every request
//! gets the single not-ready line.

use axum::extract::State;
use axum::http::{header, Uri};
use axum::response::IntoResponse;
use tracing::debug;

use crate::models::{GameId, MetadataRecord};
use crate::snapshot::{GameSnapshot, IdLookup};
use crate::AppState;

pub const NOT_READY: &str = "Server is not yet ready, try again later.";

const GAME_INFO: &str = "game_info";
const GAME_NAME_SEARCH: &str = "game_name_search";

/// Fallback handler: every path answers the text protocol
pub async fn handle_query(State(state): State<AppState>, uri: Uri) -> impl IntoResponse {
    let snapshot = state.snapshot().await;
    let body = answer_query(uri.query().unwrap_or(""), snapshot.as_deref());
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body)
}

/// Answer a raw query string (everything after the first `?`)
pub fn answer_query(raw_query: &str, snapshot: Option<&GameSnapshot>) -> String {
    let Some(snapshot) = snapshot else {
        return format!("{NOT_READY}\n");
    };

    let mut out = String::new();
    for clause in raw_query.split(['?', '&']).filter(|c| !c.is_empty()) {
        let (kind, value) = clause.split_once('=').unwrap_or((clause, ""));
        debug!(kind, value, "Query clause");
        out.push_str(&answer_clause(kind, value, snapshot));
        out.push('\n');
    }
    out
}

fn answer_clause(kind: &str, value: &str, snapshot: &GameSnapshot) -> String {
    match kind {
        GAME_INFO => game_info(value, snapshot),
        GAME_NAME_SEARCH => game_name_search(value, snapshot),
        other => format!("Unrecognised query type {other}"),
    }
}

fn game_info(value: &str, snapshot: &GameSnapshot) -> String {
    let Ok(id) = value.trim().parse::<GameId>() else {
        return format!("Invalid game id: {value}");
    };
    match snapshot.resolve_by_id(id) {
        IdLookup::Found(record) => describe(record),
        IdLookup::Unresolvable => format!("No information available for game id: {id}"),
        IdLookup::Missing => format!("No game found with id: {id}"),
    }
}

fn game_name_search(value: &str, snapshot: &GameSnapshot) -> String {
    let name = urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| value.to_string());

    match snapshot.resolve_by_name(&name) {
        Some(ids) => {
            let ids: Vec<String> = ids.iter().map(GameId::to_string).collect();
            format!("The id of your game is: {}", ids.join(","))
        }
        None => format!("No game found under name: {name}"),
    }
}

/// One-line description of a resolved record
pub fn describe(record: &MetadataRecord) -> String {
    format!(
        "{} ({}). Developed by {} and published by {}. Contains the tags {}. Review score {}/10 ({}% positive).",
        record.name,
        record.release_label(),
        list_or_unknown(&record.developers),
        list_or_unknown(&record.publishers),
        list_or_unknown(&record.tag_ids),
        record.review_score,
        record.review_percentage,
    )
}

fn list_or_unknown(items: &[String]) -> String {
    if items.is_empty() {
        "unknown".to_string()
    } else {
        items.join(", ")
    }
}
