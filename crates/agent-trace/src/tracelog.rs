//! The append-only markdown trace log.
//!
//! Each entry is a short human-readable header followed by a fenced JSON
//! block holding the full [`TraceEntry`]:
//!
//! ````text
//! ### 2026-01-29T10:00:00Z
//! Conversation: id=c1 message_id=m1 role=user
//! Excerpt: add a main function
//! File: `src/main.rs`
//! Summary: +3 -0; function_item main (1-3)
//! ```json
//! { … }
//! ```
//! ````
//!
//! [`parse_entries`] reads the fenced blocks back, ignoring anything that is
//! not a trace entry.

use crate::error::Result;
use crate::types::TraceEntry;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

const FENCE_OPEN: &str = "```json";
const FENCE_CLOSE: &str = "```";

/// Render one entry as log text.
pub fn format_entry(entry: &TraceEntry) -> Result<String> {
    let conv = &entry.conversation;
    let mut lines = vec![
        String::new(),
        format!("### {}", entry.timestamp),
        format!(
            "Conversation: id={} message_id={} role={}",
            display_opt(&conv.id),
            display_opt(&conv.message_id),
            display_opt(&conv.role)
        ),
    ];
    if let Some(excerpt) = &conv.excerpt {
        lines.push(format!("Excerpt: {}", excerpt));
    }
    lines.push(format!("File: `{}`", entry.file));
    lines.push(format!("Summary: {}", entry.summary));
    lines.push(FENCE_OPEN.to_string());
    lines.push(entry.to_json_pretty()?);
    lines.push(FENCE_CLOSE.to_string());

    let mut out = lines.join("\n");
    out.push('\n');
    Ok(out)
}

fn display_opt(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("null")
}

/// Append `entry` to the log at `path`, creating the file and its parent
/// directory if needed. The entry is written with a single `write_all`.
pub fn append(path: &Path, entry: &TraceEntry) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let text = format_entry(entry)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(text.as_bytes())?;
    file.flush()?;
    Ok(())
}

/// Read every trace entry from the log at `path`. A missing log has no
/// entries.
pub fn read_entries(path: &Path) -> Result<Vec<TraceEntry>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(parse_entries(&String::from_utf8_lossy(&bytes))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Extract fenced JSON blocks that parse as a [`TraceEntry`] carrying the
/// `trace_entry: true` marker. Other blocks are skipped.
pub fn parse_entries(text: &str) -> Vec<TraceEntry> {
    let mut entries = Vec::new();
    let mut block: Option<Vec<&str>> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(lines) = block.as_mut() {
            if trimmed == FENCE_CLOSE {
                let body = lines.join("\n");
                block = None;
                if let Some(entry) = parse_block(&body) {
                    entries.push(entry);
                }
            } else {
                lines.push(line);
            }
        } else if trimmed == FENCE_OPEN {
            block = Some(Vec::new());
        }
    }

    entries
}

fn parse_block(body: &str) -> Option<TraceEntry> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    if value.get("trace_entry").and_then(|m| m.as_bool()) != Some(true) {
        return None;
    }
    serde_json::from_value(value).ok()
}
