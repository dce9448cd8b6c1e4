//! Whole-file JSON persistence
//!
//! Each persisted structure lives in its own file and is rewritten in full.
//! Writes go to a temporary file in the target directory which is then renamed
//! over the destination, so an interrupted write leaves the previous file intact.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Load a JSON file
///
/// Returns `Ok(None)` when the file does not exist; absence is a normal
/// "not yet built" state. A present but unparseable file is an error.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
    };

    let value = serde_json::from_slice(&bytes).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(value))
}

/// Serialize `value` and atomically replace `path` with it
///
/// Serialization happens fully in memory before anything touches the disk.
pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    write_atomic(path, &bytes)?;
    debug!(path = %path.display(), bytes = bytes.len(), "Persisted JSON file");
    Ok(())
}

/// Write bytes to a sibling temp file, fsync, then rename over `path`
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
