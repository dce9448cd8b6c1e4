//! Game name normalization
//!
//! The normalized form is the key of the name index and of name lookups:
//! lowercase, with everything outside `[a-z0-9]` removed.

/// Normalize a raw game name for indexing and lookup
pub fn normalize_name(raw: &str) -> String {
    raw.chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

/// Catalog filter applied before a name is indexed
///
/// Rejects names that normalize to nothing, and names whose normalized form is
/// purely numeric while the raw name carried other characters (placeholder and
/// internal titles such as `"1234 "` or `"#2000"`). A raw name that is exactly its
/// numeric form, e.g. `"7"`, is kept.
pub fn keep_catalog_name(raw: &str) -> bool {
    let normalized = normalize_name(raw);
    if normalized.is_empty() {
        return false;
    }

    let digits_only: String = raw.chars().filter(char::is_ascii_digit).collect();
    !(raw != normalized && normalized == digits_only)
}
