//! Durable per-file snapshots.
//!
//! The state file is one JSON object keyed by root-relative path, with keys
//! sorted so the file itself diffs cleanly. Writes go to a temporary sibling
//! which is then renamed over the target, so a reader sees either the old or
//! the new state, never a torn one.

use crate::error::{Result, TraceError};
use crate::types::TrackedFile;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

pub type StateMap = BTreeMap<String, TrackedFile>;

/// File-name prefix of the temporary siblings written by [`save`].
pub const TEMP_PREFIX: &str = ".trace-state";

/// Path-keyed store of the last accepted content of every traced file.
#[derive(Debug, Clone)]
pub struct HashStore {
    path: PathBuf,
    files: StateMap,
}

impl HashStore {
    /// Open the store at `path`, loading whatever is already there.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let files = load(&path);
        Self { path, files }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, rel_path: &str) -> Option<&TrackedFile> {
        self.files.get(rel_path)
    }

    /// Stored digest for `rel_path`, if it has been traced before.
    pub fn hash_of(&self, rel_path: &str) -> Option<&str> {
        self.get(rel_path).map(|f| f.hash.as_str())
    }

    /// Previous content, or the empty string for an untracked path so that a
    /// first sighting diffs as a full addition.
    pub fn previous_content(&self, rel_path: &str) -> &str {
        self.get(rel_path).map(|f| f.content.as_str()).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Replace the snapshot for `rel_path` and persist the whole map.
    pub fn update(&mut self, rel_path: impl Into<String>, file: TrackedFile) -> Result<()> {
        self.files.insert(rel_path.into(), file);
        save(&self.path, &self.files)
    }
}

/// Read the state file. A missing, unreadable or malformed file is
/// treated as empty state.
pub fn load(path: &Path) -> StateMap {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return StateMap::new(),
        Err(e) => {
            warn!(path = %path.display(), "state file unreadable, starting empty: {}", e);
            return StateMap::new();
        }
    };
    match serde_json::from_str(&data) {
        Ok(files) => files,
        Err(e) => {
            warn!(path = %path.display(), "state file corrupt, starting empty: {}", e);
            StateMap::new()
        }
    }
}

/// Atomically write `files` to `path`.
pub fn save(path: &Path, files: &StateMap) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(".tmp")
        .tempfile_in(dir)?;
    let value = serde_json::to_value(files)?;
    serde_json::to_writer_pretty(&tmp, &value)?;
    tmp.persist(path).map_err(|e| TraceError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}
