use serde::{Deserialize, Serialize};

// ============================================================================
// Tracked state
// ============================================================================

/// Last accepted snapshot of a single file, keyed by its root-relative path.
///
/// `hash` is always the digest of `content`; both are replaced together on
/// every accepted change.
///
/// # JSON shape
///
/// ```json
/// { "content": "fn main() {}\n", "hash": "5f0c…", "updated_at": "2026-01-29T10:00:00Z" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedFile {
    pub content: String,
    pub hash: String,
    pub updated_at: String,
}

impl TrackedFile {
    /// Snapshot `content`, computing its digest.
    pub fn new(content: impl Into<String>, updated_at: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            hash: crate::digest(&content),
            content,
            updated_at: updated_at.into(),
        }
    }
}

// ============================================================================
// Diff
// ============================================================================

/// One contiguous region of a zero-context unified diff.
///
/// Line numbers are 1-based as written in the `@@ -a,b +c,d @@` header. A
/// pure insertion has `old_lines == 0` and `old_start` naming the line it
/// follows; a pure deletion has `new_lines == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    pub old_start: usize,
    pub old_lines: usize,
    pub new_start: usize,
    pub new_lines: usize,
}

impl Hunk {
    /// Inclusive new-side line range touched by this hunk.
    ///
    /// Deletions still occupy one line so the surrounding syntax is found.
    pub fn new_range(&self) -> (usize, usize) {
        let len = self.new_lines.max(1);
        (self.new_start, self.new_start.saturating_add(len - 1))
    }
}

/// Line counts and hunk ranges between two text snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub added: usize,
    pub deleted: usize,
    pub hunks: Vec<Hunk>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty() && self.added == 0 && self.deleted == 0
    }
}

// ============================================================================
// Syntax
// ============================================================================

/// Compact description of one parsed node overlapping a change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeSummary {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    pub start: usize,
    pub end: usize,
}

impl std::fmt::Display for NodeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(name) = &self.name {
            write!(f, " {}", name)?;
        }
        write!(f, " ({}-{})", self.start, self.end)
    }
}

// ============================================================================
// Conversation
// ============================================================================

/// Snapshot of a conversation turn, embedded by value into a [`TraceEntry`].
///
/// Every field is optional: an absent or unreadable conversation log yields
/// [`ConversationRef::default()`], never an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
}

impl ConversationRef {
    /// Grouping key used when several changes stem from the same turn.
    pub fn identity_key(&self) -> String {
        format!(
            "{}::{}::{}",
            self.id.as_deref().unwrap_or(""),
            self.message_id.as_deref().unwrap_or(""),
            self.role.as_deref().unwrap_or("")
        )
    }
}

// ============================================================================
// Git
// ============================================================================

/// Repository state at the moment a change was recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitContext {
    #[serde(default)]
    pub head: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub dirty: Option<bool>,
}

// ============================================================================
// Trace entry
// ============================================================================

fn trace_marker() -> bool {
    true
}

/// One durable record linking a file change to the conversation turn that
/// was current when the change settled.
///
/// Entries are written once and never rewritten. The `trace_entry` marker is
/// what lets a reader tell these blocks apart from other JSON in the log.
///
/// # JSON shape
///
/// ```json
/// {
///   "ast": [{ "end": 3, "name": "main", "start": 1, "type": "function_item" }],
///   "change": { "added": 1, "deleted": 0, "hunks": [ … ] },
///   "conversation": { "id": "c1", "message_id": "m1", "role": "user", … },
///   "file": "src/main.rs",
///   "summary": "+1 -0; function_item main (1-3)",
///   "timestamp": "2026-01-29T10:00:00Z",
///   "trace_entry": true
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    #[serde(default = "trace_marker")]
    pub trace_entry: bool,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub conversation: ConversationRef,
    pub file: String,
    #[serde(default)]
    pub change: DiffResult,
    #[serde(default)]
    pub ast: Vec<NodeSummary>,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitContext>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<ConversationRef>,
}

impl TraceEntry {
    /// Assemble an entry, deriving the one-line summary from the diff counts
    /// and the syntax matches.
    pub fn new(
        timestamp: impl Into<String>,
        conversation: ConversationRef,
        file: impl Into<String>,
        change: DiffResult,
        ast: Vec<NodeSummary>,
    ) -> Self {
        let summary = format!(
            "+{} -{}; {}",
            change.added,
            change.deleted,
            crate::syntax::summarize(&ast)
        );
        Self {
            trace_entry: true,
            timestamp: timestamp.into(),
            conversation,
            file: file.into(),
            change,
            ast,
            summary,
            git: None,
            context: Vec::new(),
        }
    }

    pub fn with_git(mut self, git: Option<GitContext>) -> Self {
        self.git = git;
        self
    }

    pub fn with_context(mut self, context: Vec<ConversationRef>) -> Self {
        self.context = context;
        self
    }

    /// Serialize with keys sorted at every level.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        let value = serde_json::to_value(self)?;
        serde_json::to_string_pretty(&value)
    }
}
