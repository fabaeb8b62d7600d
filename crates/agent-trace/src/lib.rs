#![doc = include_str!("../README.md")]

pub mod conversation;
pub mod debounce;
pub mod diff;
pub mod error;
pub mod exclude;
pub mod git;
#[cfg(feature = "grammars")]
pub mod grammars;
pub mod recorder;
pub mod state;
pub mod syntax;
pub mod tracelog;
pub mod types;
#[cfg(feature = "watcher")]
pub mod watch;

pub use debounce::{EventDebouncer, EventKind, PendingChange};
pub use error::{Result, TraceError};
pub use exclude::ExcludePolicy;
pub use recorder::{Outcome, SkipReason, TraceRecorder};
pub use state::HashStore;
pub use syntax::{Annotation, LanguageBackend, LanguageRegistry, SyntaxAnnotator};
pub use types::{
    ConversationRef, DiffResult, GitContext, Hunk, NodeSummary, TraceEntry, TrackedFile,
};
#[cfg(feature = "watcher")]
pub use watch::{WatchConfig, run};

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `text`.
///
/// ```
/// assert_eq!(
///     agent_trace::digest(""),
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
/// );
/// ```
pub fn digest(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}
