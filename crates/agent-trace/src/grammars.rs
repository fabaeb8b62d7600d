//! Tree-sitter parsing backend with the bundled grammars.

use crate::syntax::{LanguageBackend, SyntaxTree};
use tracing::warn;
use tree_sitter::{Language, Parser, Tree};

pub struct TreeSitterBackend {
    name: &'static str,
    extensions: &'static [&'static str],
    language: Language,
}

impl TreeSitterBackend {
    pub fn new(name: &'static str, extensions: &'static [&'static str], language: Language) -> Self {
        Self {
            name,
            extensions,
            language,
        }
    }

    /// One backend per grammar linked into this build.
    pub fn bundled() -> Vec<Self> {
        vec![
            Self::new("rust", &["rs"], tree_sitter_rust::LANGUAGE.into()),
            Self::new("python", &["py", "pyi"], tree_sitter_python::LANGUAGE.into()),
            Self::new(
                "javascript",
                &["js", "jsx", "mjs", "cjs"],
                tree_sitter_javascript::LANGUAGE.into(),
            ),
            Self::new(
                "typescript",
                &["ts", "mts", "cts"],
                tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            ),
            Self::new("tsx", &["tsx"], tree_sitter_typescript::LANGUAGE_TSX.into()),
            Self::new("go", &["go"], tree_sitter_go::LANGUAGE.into()),
        ]
    }
}

impl LanguageBackend for TreeSitterBackend {
    fn name(&self) -> &str {
        self.name
    }

    fn can_handle(&self, extension: &str) -> bool {
        self.extensions.contains(&extension)
    }

    fn parse(&self, source: &str) -> Option<SyntaxTree> {
        let mut parser = Parser::new();
        if let Err(e) = parser.set_language(&self.language) {
            warn!(language = self.name, "grammar rejected by tree-sitter: {}", e);
            return None;
        }
        let tree = parser.parse(source, None)?;
        Some(convert(&tree))
    }
}

/// Copy the named nodes of `tree` into an arena. Anonymous nodes are
/// skipped and their named descendants attach to the nearest named ancestor.
fn convert(tree: &Tree) -> SyntaxTree {
    let mut out = SyntaxTree::new();
    let mut cursor = tree.walk();
    // Parent to use for the children of each open level.
    let mut parents: Vec<Option<usize>> = Vec::new();
    loop {
        let node = cursor.node();
        let parent = parents.last().copied().flatten();
        let id = node.is_named().then(|| {
            out.push(
                parent,
                node.kind(),
                (node.start_byte(), node.end_byte()),
                (node.start_position().row, node.end_position().row),
            )
        });
        if cursor.goto_first_child() {
            parents.push(id.or(parent));
            continue;
        }
        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                return out;
            }
            parents.pop();
        }
    }
}
