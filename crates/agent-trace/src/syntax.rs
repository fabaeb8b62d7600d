//! Syntax-level summaries of a change.
//!
//! A [`SyntaxAnnotator`] maps the new-side line ranges of a diff onto the
//! nodes of a parsed source tree. Parsing is a pluggable capability: each
//! [`LanguageBackend`] claims file extensions and turns source text into an
//! owned [`SyntaxTree`]. A file nobody claims is not an error; it simply has
//! no syntax summary.
//!
//! # Example
//!
//! ```
//! use agent_trace::syntax::{summarize, LanguageRegistry, SyntaxAnnotator};
//! use agent_trace::Hunk;
//! use std::path::Path;
//!
//! let annotator = SyntaxAnnotator::new(LanguageRegistry::new());
//! let hunks = [Hunk { old_start: 0, old_lines: 0, new_start: 1, new_lines: 1 }];
//! let nodes = annotator.annotate(Path::new("notes.txt"), "hello\n", &hunks).into_nodes();
//! assert!(nodes.is_empty());
//! assert_eq!(summarize(&nodes), "no AST matches");
//! ```

use crate::types::{Hunk, NodeSummary};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Upper bound on summaries kept per change.
pub const MAX_NODES: usize = 12;

/// Child kinds whose text names their parent (first match wins).
const NAME_KINDS: &[&str] = &["identifier", "name", "type_identifier"];

// ============================================================================
// Trees and backends
// ============================================================================

/// A parsed node with its byte span and 0-based row span. Children are
/// indices into the owning [`SyntaxTree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxNode {
    pub kind: String,
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_row: usize,
    pub end_row: usize,
    pub children: Vec<usize>,
}

impl SyntaxNode {
    /// 1-based inclusive line span.
    pub fn lines(&self) -> (usize, usize) {
        (self.start_row + 1, self.end_row + 1)
    }
}

/// Parsed source as a flat arena; node 0 is the root.
///
/// Nodes never own each other, so arbitrarily deep source neither builds
/// nor drops the tree recursively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyntaxTree {
    nodes: Vec<SyntaxNode>,
}

impl SyntaxTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node under `parent` (or as the root) and return its index.
    /// Children keep the order in which they are pushed.
    pub fn push(
        &mut self,
        parent: Option<usize>,
        kind: impl Into<String>,
        bytes: (usize, usize),
        rows: (usize, usize),
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(SyntaxNode {
            kind: kind.into(),
            start_byte: bytes.0,
            end_byte: bytes.1,
            start_row: rows.0,
            end_row: rows.1,
            children: Vec::new(),
        });
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(p)) {
            parent.children.push(id);
        }
        id
    }

    pub fn root(&self) -> Option<&SyntaxNode> {
        self.nodes.first()
    }

    pub fn get(&self, id: usize) -> Option<&SyntaxNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Text of the first child whose kind names its parent.
    fn name_of<'s>(&self, node: &SyntaxNode, source: &'s str) -> Option<&'s str> {
        node.children
            .iter()
            .filter_map(|&id| self.get(id))
            .find(|child| NAME_KINDS.contains(&child.kind.as_str()))
            .and_then(|child| source.get(child.start_byte..child.end_byte))
    }
}

/// Capability to parse one or more source languages.
pub trait LanguageBackend: Send + Sync {
    /// Language name, for logging.
    fn name(&self) -> &str;

    /// Whether this backend parses files with `extension` (no leading dot).
    fn can_handle(&self, extension: &str) -> bool;

    /// Parse `source`, tolerating syntax errors where the backend can.
    /// `None` means the backend could not produce a tree at all.
    fn parse(&self, source: &str) -> Option<SyntaxTree>;
}

/// Ordered set of backends; the first one claiming an extension wins.
#[derive(Default)]
pub struct LanguageRegistry {
    backends: Vec<Box<dyn LanguageBackend>>,
}

impl LanguageRegistry {
    /// An empty registry. Every lookup misses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every grammar compiled into this build.
    pub fn with_bundled() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "grammars")]
        for backend in crate::grammars::TreeSitterBackend::bundled() {
            registry.register(backend);
        }
        registry
    }

    pub fn register(&mut self, backend: impl LanguageBackend + 'static) {
        self.backends.push(Box::new(backend));
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn backend_for(&self, path: &Path) -> Option<&dyn LanguageBackend> {
        let ext = path.extension()?.to_str()?;
        self.backends
            .iter()
            .find(|b| b.can_handle(ext))
            .map(|b| b.as_ref())
    }
}

impl std::fmt::Debug for LanguageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.backends.iter().map(|b| b.name()))
            .finish()
    }
}

// ============================================================================
// Annotation
// ============================================================================

/// Outcome of annotating one change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    Nodes(Vec<NodeSummary>),
    /// The diff had no hunks; the parser was not invoked.
    NoHunks,
    /// No backend claims this file's extension.
    Unsupported,
    /// A backend claimed the file but produced no tree.
    ParseFailed,
}

impl Annotation {
    pub fn into_nodes(self) -> Vec<NodeSummary> {
        match self {
            Annotation::Nodes(nodes) => nodes,
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct SyntaxAnnotator {
    registry: LanguageRegistry,
}

impl SyntaxAnnotator {
    pub fn new(registry: LanguageRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    /// Summarise the nodes of `source` whose line span overlaps any hunk's
    /// new-side range.
    pub fn annotate(&self, path: &Path, source: &str, hunks: &[Hunk]) -> Annotation {
        if hunks.is_empty() {
            return Annotation::NoHunks;
        }
        let Some(backend) = self.registry.backend_for(path) else {
            return Annotation::Unsupported;
        };
        let Some(tree) = backend.parse(source) else {
            debug!(path = %path.display(), language = backend.name(), "parser produced no tree");
            return Annotation::ParseFailed;
        };
        let ranges: Vec<(usize, usize)> = hunks.iter().map(Hunk::new_range).collect();
        let matches = collect_overlapping(&tree, source, &ranges);
        Annotation::Nodes(dedup_and_truncate(matches))
    }
}

/// Pre-order walk recording every node that intersects a range. A matching
/// node does not stop the descent, so nested matches are all reported.
fn collect_overlapping(
    tree: &SyntaxTree,
    source: &str,
    ranges: &[(usize, usize)],
) -> Vec<NodeSummary> {
    let mut found = Vec::new();
    let mut stack: Vec<usize> = if tree.is_empty() { Vec::new() } else { vec![0] };
    while let Some(id) = stack.pop() {
        let Some(node) = tree.get(id) else {
            continue;
        };
        let (start, end) = node.lines();
        if ranges.iter().any(|&(lo, hi)| start <= hi && end >= lo) {
            found.push(NodeSummary {
                kind: node.kind.clone(),
                name: tree.name_of(node, source).map(str::to_string),
                start,
                end,
            });
        }
        stack.extend(node.children.iter().rev());
    }
    found
}

/// Drop repeated `(kind, name, start, end)` tuples, keeping first
/// occurrence order, then keep at most [`MAX_NODES`].
pub fn dedup_and_truncate(nodes: Vec<NodeSummary>) -> Vec<NodeSummary> {
    let mut seen = HashSet::new();
    nodes
        .into_iter()
        .filter(|node| seen.insert(node.clone()))
        .take(MAX_NODES)
        .collect()
}

/// One-line digest: the first three summaries, then `...` if there are more.
pub fn summarize(nodes: &[NodeSummary]) -> String {
    if nodes.is_empty() {
        return "no AST matches".to_string();
    }
    let mut parts: Vec<String> = nodes.iter().take(3).map(|n| n.to_string()).collect();
    if nodes.len() > 3 {
        parts.push("...".to_string());
    }
    parts.join(", ")
}
