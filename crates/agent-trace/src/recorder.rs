//! Turning one settled file change into one trace entry.
//!
//! [`TraceRecorder::process`] is the per-path state machine: it either
//! records an entry (appending to the trace log, then updating the hash
//! store) or reports why it skipped the path. Only I/O failures on the log
//! or the state file are errors.

use crate::error::Result;
use crate::exclude::{ExcludePolicy, relative_key};
use crate::state::HashStore;
use crate::syntax::{LanguageRegistry, SyntaxAnnotator};
use crate::types::{TraceEntry, TrackedFile};
use crate::{conversation, diff, git, tracelog};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Current UTC time, second precision.
pub fn now_iso8601() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Why a path produced no entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The file disappeared before it could be read.
    Vanished,
    /// The path exists but is a directory or other non-regular file.
    NotAFile,
    /// The path matches the exclusion policy.
    Excluded,
    OutsideRoot,
    /// The content digest matches the stored one.
    Unchanged,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            SkipReason::Vanished => "vanished",
            SkipReason::NotAFile => "not a regular file",
            SkipReason::Excluded => "excluded",
            SkipReason::OutsideRoot => "outside root",
            SkipReason::Unchanged => "unchanged",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Recorded(TraceEntry),
    Skipped(SkipReason),
}

impl Outcome {
    pub fn entry(&self) -> Option<&TraceEntry> {
        match self {
            Outcome::Recorded(entry) => Some(entry),
            Outcome::Skipped(_) => None,
        }
    }
}

#[derive(Debug)]
pub struct TraceRecorder {
    root: PathBuf,
    trace_log: PathBuf,
    conversation_log: Option<PathBuf>,
    store: HashStore,
    annotator: SyntaxAnnotator,
    policy: ExcludePolicy,
    git: bool,
    context_turns: usize,
}

impl TraceRecorder {
    /// Recorder for files under `root` (canonical), appending to
    /// `trace_log`. The log and the store's file are excluded from tracing.
    pub fn new(root: impl Into<PathBuf>, trace_log: impl Into<PathBuf>, store: HashStore) -> Self {
        let root = root.into();
        let trace_log = trace_log.into();
        let policy = ExcludePolicy::new(&root)
            .with_file(&trace_log)
            .with_file(store.path());
        Self {
            root,
            trace_log,
            conversation_log: None,
            store,
            annotator: SyntaxAnnotator::new(LanguageRegistry::with_bundled()),
            policy,
            git: true,
            context_turns: 0,
        }
    }

    pub fn with_conversation_log(mut self, log: Option<PathBuf>) -> Self {
        self.conversation_log = log;
        self
    }

    pub fn with_annotator(mut self, annotator: SyntaxAnnotator) -> Self {
        self.annotator = annotator;
        self
    }

    /// Replace the exclusion policy. Its root should match the recorder's.
    pub fn with_policy(mut self, policy: ExcludePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_git(mut self, enabled: bool) -> Self {
        self.git = enabled;
        self
    }

    /// Attach the last `turns` conversation records to every entry.
    pub fn with_context_turns(mut self, turns: usize) -> Self {
        self.context_turns = turns;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn trace_log(&self) -> &Path {
        &self.trace_log
    }

    pub fn store(&self) -> &HashStore {
        &self.store
    }

    pub fn policy(&self) -> &ExcludePolicy {
        &self.policy
    }

    /// Evaluate `path` now.
    pub fn process(&mut self, path: &Path) -> Result<Outcome> {
        self.process_at(path, &now_iso8601())
    }

    /// Evaluate `path`, stamping any entry with `timestamp`.
    pub fn process_at(&mut self, path: &Path, timestamp: &str) -> Result<Outcome> {
        let meta = match std::fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(self.skip(path, SkipReason::Vanished));
            }
            Err(e) => return Err(e.into()),
        };
        if !meta.is_file() {
            return Ok(self.skip(path, SkipReason::NotAFile));
        }
        let Some(rel) = relative_key(&self.root, path) else {
            return Ok(self.skip(path, SkipReason::OutsideRoot));
        };
        if self.policy.is_excluded(path) {
            return Ok(self.skip(path, SkipReason::Excluded));
        }

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(self.skip(path, SkipReason::Vanished));
            }
            Err(e) => return Err(e.into()),
        };
        let current = TrackedFile::new(String::from_utf8_lossy(&bytes), timestamp);
        if self.store.hash_of(&rel) == Some(current.hash.as_str()) {
            return Ok(self.skip(path, SkipReason::Unchanged));
        }

        let change = diff::compute(self.store.previous_content(&rel), &current.content);
        let ast = self
            .annotator
            .annotate(path, &current.content, &change.hunks)
            .into_nodes();
        let (conversation, context) =
            conversation::snapshot(self.conversation_log.as_deref(), self.context_turns);
        let git = if self.git { git::context(&self.root) } else { None };

        let entry = TraceEntry::new(timestamp, conversation, rel.as_str(), change, ast)
            .with_git(git)
            .with_context(context);

        tracelog::append(&self.trace_log, &entry)?;
        self.store.update(rel, current)?;
        info!(file = %entry.file, "{}", entry.summary);
        Ok(Outcome::Recorded(entry))
    }

    fn skip(&self, path: &Path, reason: SkipReason) -> Outcome {
        debug!(path = %path.display(), %reason, "skipped");
        Outcome::Skipped(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{LanguageBackend, SyntaxTree};
    use std::io::Write;
    use tempfile::TempDir;

    const TS: &str = "2026-01-29T10:00:00Z";

    /// Parses every line into a `line` node named by its first word.
    struct LineBackend;

    impl LanguageBackend for LineBackend {
        fn name(&self) -> &str {
            "lines"
        }

        fn can_handle(&self, extension: &str) -> bool {
            extension == "txt"
        }

        fn parse(&self, source: &str) -> Option<SyntaxTree> {
            let last_row = source.lines().count().saturating_sub(1);
            let mut tree = SyntaxTree::new();
            let root = tree.push(None, "document", (0, source.len()), (0, last_row));
            let mut offset = 0;
            for (row, line) in source.lines().enumerate() {
                let word_len = line.split_whitespace().next().map_or(0, str::len);
                let id = tree.push(Some(root), "line", (offset, offset + line.len()), (row, row));
                tree.push(Some(id), "identifier", (offset, offset + word_len), (row, row));
                offset += line.len() + 1;
            }
            Some(tree)
        }
    }

    fn setup() -> (TempDir, PathBuf, TraceRecorder) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        let store = HashStore::open(root.join(".trace_state.json"));
        let mut registry = LanguageRegistry::new();
        registry.register(LineBackend);
        let recorder = TraceRecorder::new(&root, root.join("docs/agent-trace.md"), store)
            .with_annotator(SyntaxAnnotator::new(registry))
            .with_git(false);
        (temp, root, recorder)
    }

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_first_write_is_full_addition() {
        let (_temp, root, mut recorder) = setup();
        let file = root.join("notes.txt");
        write(&file, "alpha one\nbeta two\n");

        let outcome = recorder.process_at(&file, TS).unwrap();
        let entry = outcome.entry().unwrap();
        assert_eq!(entry.file, "notes.txt");
        assert_eq!(entry.change.added, 2);
        assert_eq!(entry.change.deleted, 0);
        assert_eq!(entry.timestamp, TS);
        assert!(entry.git.is_none());
        assert!(entry.context.is_empty());
        assert!(entry.summary.starts_with("+2 -0; "));

        let stored = recorder.store().get("notes.txt").unwrap();
        assert_eq!(stored.content, "alpha one\nbeta two\n");
        assert_eq!(stored.hash, crate::digest("alpha one\nbeta two\n"));
    }

    #[test]
    fn test_same_content_twice_records_once() {
        let (_temp, root, mut recorder) = setup();
        let file = root.join("notes.txt");
        write(&file, "alpha\n");

        assert!(matches!(
            recorder.process_at(&file, TS).unwrap(),
            Outcome::Recorded(_)
        ));
        assert_eq!(
            recorder.process_at(&file, TS).unwrap(),
            Outcome::Skipped(SkipReason::Unchanged)
        );

        let entries = tracelog::read_entries(recorder.trace_log()).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_unchanged_across_restart() {
        let (_temp, root, mut recorder) = setup();
        let file = root.join("notes.txt");
        write(&file, "alpha\n");
        recorder.process_at(&file, TS).unwrap();

        let store = HashStore::open(root.join(".trace_state.json"));
        let mut reopened = TraceRecorder::new(&root, root.join("docs/agent-trace.md"), store)
            .with_git(false);
        assert_eq!(
            reopened.process_at(&file, TS).unwrap(),
            Outcome::Skipped(SkipReason::Unchanged)
        );
    }

    #[test]
    fn test_edit_annotates_changed_lines_only() {
        let (_temp, root, mut recorder) = setup();
        let file = root.join("notes.txt");
        write(&file, "alpha\nbeta\ngamma\n");
        recorder.process_at(&file, TS).unwrap();

        write(&file, "alpha\nbeta\ndelta\n");
        let outcome = recorder.process_at(&file, TS).unwrap();
        let entry = outcome.entry().unwrap();
        assert_eq!(entry.change.added, 1);
        assert_eq!(entry.change.deleted, 1);

        // The document root spans every line, so it overlaps too.
        let kinds: Vec<_> = entry.ast.iter().map(|n| n.kind.as_str()).collect();
        assert_eq!(kinds, vec!["document", "line", "identifier"]);
        assert_eq!(entry.ast[1].name.as_deref(), Some("delta"));
        assert!(entry.ast.iter().all(|n| n.start <= 3 && n.end >= 3));
        assert_eq!(
            entry.summary,
            "+1 -1; document (1-3), line delta (3-3), identifier (3-3)"
        );
    }

    #[test]
    fn test_log_then_state_are_both_written() {
        let (_temp, root, mut recorder) = setup();
        let file = root.join("src/a.txt");
        write(&file, "x\n");
        recorder.process_at(&file, TS).unwrap();

        let log = std::fs::read_to_string(root.join("docs/agent-trace.md")).unwrap();
        assert!(log.contains("File: `src/a.txt`"));
        let state = crate::state::load(&root.join(".trace_state.json"));
        assert!(state.contains_key("src/a.txt"));
    }

    #[test]
    fn test_conversation_and_context_attached() {
        let (_temp, root, recorder) = setup();
        let conv_log = root.join("conv.jsonl");
        let mut f = std::fs::File::create(&conv_log).unwrap();
        writeln!(f, r#"{{"id":"c1","message_id":"m1","role":"user","content":"first"}}"#).unwrap();
        writeln!(f, r#"{{"id":"c1","message_id":"m2","role":"assistant","content":"second"}}"#)
            .unwrap();
        drop(f);

        let mut recorder = recorder
            .with_conversation_log(Some(conv_log.clone()))
            .with_policy(
                ExcludePolicy::new(&root)
                    .with_file(root.join("docs/agent-trace.md"))
                    .with_file(root.join(".trace_state.json"))
                    .with_file(&conv_log),
            )
            .with_context_turns(2);
        let file = root.join("notes.txt");
        write(&file, "alpha\n");

        let outcome = recorder.process_at(&file, TS).unwrap();
        let entry = outcome.entry().unwrap();
        assert_eq!(entry.conversation.message_id.as_deref(), Some("m2"));
        assert_eq!(entry.conversation.excerpt.as_deref(), Some("second"));
        assert_eq!(entry.context.len(), 2);
        assert_eq!(entry.context[0].message_id.as_deref(), Some("m1"));
        assert_eq!(entry.context.last(), Some(&entry.conversation));

        assert_eq!(
            recorder.process_at(&conv_log, TS).unwrap(),
            Outcome::Skipped(SkipReason::Excluded)
        );
    }

    #[test]
    fn test_excluded_and_own_outputs_skipped() {
        let (_temp, root, mut recorder) = setup();
        let vendored = root.join("node_modules/pkg/index.txt");
        write(&vendored, "x\n");
        assert_eq!(
            recorder.process_at(&vendored, TS).unwrap(),
            Outcome::Skipped(SkipReason::Excluded)
        );

        let plain = root.join("a.txt");
        write(&plain, "x\n");
        recorder.process_at(&plain, TS).unwrap();
        for own in [root.join("docs/agent-trace.md"), root.join(".trace_state.json")] {
            assert_eq!(
                recorder.process_at(&own, TS).unwrap(),
                Outcome::Skipped(SkipReason::Excluded)
            );
        }
        assert!(recorder.store().get("node_modules/pkg/index.txt").is_none());
    }

    #[test]
    fn test_vanished_and_directory_skipped() {
        let (_temp, root, mut recorder) = setup();
        assert_eq!(
            recorder.process_at(&root.join("gone.txt"), TS).unwrap(),
            Outcome::Skipped(SkipReason::Vanished)
        );
        std::fs::create_dir(root.join("dir")).unwrap();
        assert_eq!(
            recorder.process_at(&root.join("dir"), TS).unwrap(),
            Outcome::Skipped(SkipReason::NotAFile)
        );
        assert!(!root.join("docs/agent-trace.md").exists());
    }

    #[test]
    fn test_outside_root_skipped() {
        let (_temp, _root, mut recorder) = setup();
        let other = TempDir::new().unwrap();
        let file = other.path().join("a.txt");
        write(&file, "x\n");
        assert_eq!(
            recorder.process_at(&file, TS).unwrap(),
            Outcome::Skipped(SkipReason::OutsideRoot)
        );
    }

    #[test]
    fn test_unsupported_extension_has_no_ast() {
        let (_temp, root, mut recorder) = setup();
        let file = root.join("data.bin");
        write(&file, "one\ntwo\n");
        let outcome = recorder.process_at(&file, TS).unwrap();
        let entry = outcome.entry().unwrap();
        assert!(entry.ast.is_empty());
        assert_eq!(entry.summary, "+2 -0; no AST matches");
    }

    #[test]
    fn test_git_context_attached_in_repository() {
        let (_temp, root, recorder) = setup();
        git2::Repository::init(&root).unwrap();
        let mut recorder = recorder.with_git(true);
        let file = root.join("a.txt");
        write(&file, "x\n");
        let outcome = recorder.process_at(&file, TS).unwrap();
        let git = outcome.entry().unwrap().git.clone().unwrap();
        assert_eq!(git.dirty, Some(true));
    }

    #[test]
    fn test_now_iso8601_shape() {
        let now = now_iso8601();
        assert_eq!(now.len(), 20);
        assert!(now.ends_with('Z'));
        assert_eq!(&now[10..11], "T");
    }
}
