//! Repository context attached to trace entries.

use crate::types::GitContext;
use git2::{Repository, StatusOptions};
use std::path::Path;
use tracing::debug;

/// Snapshot HEAD, branch and dirtiness of the repository containing `root`.
///
/// Returns `None` when `root` is not inside a repository. Within a
/// repository each field degrades independently: an unborn HEAD has no
/// commit, a detached HEAD has no branch.
pub fn context(root: &Path) -> Option<GitContext> {
    let repo = match Repository::discover(root) {
        Ok(repo) => repo,
        Err(e) => {
            debug!(root = %root.display(), "no git repository: {}", e.message());
            return None;
        }
    };

    let head = repo.head().ok();
    let commit = head
        .as_ref()
        .and_then(|h| h.peel_to_commit().ok())
        .map(|c| c.id().to_string());
    let branch = head
        .as_ref()
        .filter(|h| h.is_branch())
        .and_then(|h| h.shorthand().map(str::to_string));

    Some(GitContext {
        head: commit,
        branch,
        dirty: is_dirty(&repo),
    })
}

fn is_dirty(repo: &Repository) -> Option<bool> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true).include_ignored(false);
    repo.statuses(Some(&mut opts))
        .map(|statuses| !statuses.is_empty())
        .ok()
}
