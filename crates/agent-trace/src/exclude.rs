//! Which paths under the watch root are never traced.

use crate::state::TEMP_PREFIX;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

/// Directory names skipped wherever they appear in a path.
pub const DEFAULT_SEGMENTS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".venv",
    "venv",
    "node_modules",
    ".pytest_cache",
    "target",
];

#[derive(Debug, Clone)]
pub struct ExcludePolicy {
    root: PathBuf,
    segments: BTreeSet<String>,
    files: Vec<PathBuf>,
}

impl ExcludePolicy {
    /// Default segments only. `root` should already be canonical.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            segments: DEFAULT_SEGMENTS.iter().map(|s| s.to_string()).collect(),
            files: Vec::new(),
        }
    }

    /// Also skip any path containing `segment` as a component.
    pub fn with_segment(mut self, segment: impl Into<String>) -> Self {
        self.segments.insert(segment.into());
        self
    }

    /// Also skip exactly `file` (the trace log, the state file).
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.files.push(file.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether events for `path` must be dropped. Paths outside the root are
    /// always excluded.
    pub fn is_excluded(&self, path: &Path) -> bool {
        let Ok(rel) = path.strip_prefix(&self.root) else {
            return true;
        };
        if self.files.iter().any(|f| f == path) {
            return true;
        }
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(TEMP_PREFIX))
        {
            return true;
        }
        rel.components().any(|c| match c {
            Component::Normal(name) => name
                .to_str()
                .is_some_and(|name| self.segments.contains(name)),
            _ => false,
        })
    }
}

/// Root-relative path with `/` separators, as used for state keys and
/// trace entries.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
