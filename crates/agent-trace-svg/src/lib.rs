//! Render an agent-trace log as an SVG diagram.
//!
//! Conversation turns are drawn in a left column, one box per distinct
//! turn. File changes are drawn in a right column, one box per trace entry,
//! with a line from each change back to the turn that was current when it
//! was recorded.
//!
//! # Example
//!
//! ```
//! use agent_trace::{ConversationRef, DiffResult, TraceEntry};
//! use agent_trace_svg::{render, RenderOptions};
//!
//! let conv = ConversationRef {
//!     id: Some("c1".into()),
//!     message_id: Some("m1".into()),
//!     role: Some("user".into()),
//!     ..Default::default()
//! };
//! let entry = TraceEntry::new("2026-01-29T10:00:00Z", conv, "src/main.rs", DiffResult::default(), vec![]);
//!
//! let svg = render(&[entry], &RenderOptions::default());
//! assert!(svg.contains("src/main.rs"));
//! assert!(svg.contains("user m1"));
//! ```

use agent_trace::TraceEntry;
use agent_trace::tracelog;
use std::collections::HashMap;
use std::path::Path;

/// Drawn when the log holds no entries.
pub const EMPTY_CANVAS: &str =
    r#"<svg xmlns="http://www.w3.org/2000/svg" width="800" height="120"></svg>"#;

const LEFT_X: u32 = 40;
const RIGHT_X: u32 = 520;
const CONV_BOX_WIDTH: u32 = 420;
const CHANGE_BOX_WIDTH: u32 = 440;
const BOX_HEIGHT: u32 = 36;
const MIN_HEIGHT: u32 = 180;

/// Options controlling what is drawn.
pub struct RenderOptions {
    /// Canvas width in pixels.
    pub width: u32,
    /// Vertical distance between rows.
    pub row_height: u32,
    /// Draw each entry's one-line summary under its file name.
    pub show_summary: bool,
    /// Prefix each file name with the entry's time of day.
    pub show_timestamps: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: 1000,
            row_height: 52,
            show_summary: true,
            show_timestamps: false,
        }
    }
}

/// Render `entries` in log order.
pub fn render(entries: &[TraceEntry], options: &RenderOptions) -> String {
    if entries.is_empty() {
        return EMPTY_CANVAS.to_string();
    }

    // Distinct turns in order of first appearance.
    let mut rows: HashMap<String, usize> = HashMap::new();
    let mut turns = Vec::new();
    for entry in entries {
        let key = entry.conversation.identity_key();
        if !rows.contains_key(&key) {
            rows.insert(key, turns.len());
            turns.push(&entry.conversation);
        }
    }

    let row_height = options.row_height;
    let height = canvas_height(entries.len(), turns.len(), row_height);
    let row_y = |i: usize| row_height + i as u32 * row_height;

    let mut parts = Vec::new();
    parts.push(format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}">"#,
        options.width, height
    ));
    parts.push("<style>text{font-family:Arial,sans-serif;font-size:12px;}</style>".to_string());
    parts.push(r##"<rect width="100%" height="100%" fill="#fff" />"##.to_string());

    // ── Conversation column ──────────────────────────────────────────
    parts.push(format!(
        r##"<text x="{}" y="24" fill="#111">Conversation</text>"##,
        LEFT_X
    ));
    for (i, conv) in turns.iter().enumerate() {
        let y = row_y(i);
        let label: Vec<&str> = [conv.role.as_deref(), conv.message_id.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect();
        parts.push(format!(
            r##"<rect x="{}" y="{}" width="{}" height="{}" rx="6" fill="#f2f4f8" stroke="#cbd5e1" />"##,
            LEFT_X, y, CONV_BOX_WIDTH, BOX_HEIGHT
        ));
        parts.push(format!(
            r##"<text x="{}" y="{}" fill="#111">{}</text>"##,
            LEFT_X + 10,
            y + 22,
            sanitize(Some(&label.join(" ")))
        ));
    }

    // ── Change column ────────────────────────────────────────────────
    parts.push(format!(
        r##"<text x="{}" y="24" fill="#111">Change</text>"##,
        RIGHT_X
    ));
    for (i, entry) in entries.iter().enumerate() {
        let y = row_y(i);
        let mut file_label = sanitize(Some(&entry.file));
        if options.show_timestamps
            && let Some(time) = time_of_day(&entry.timestamp)
        {
            file_label = format!("{} {}", sanitize(Some(time)), file_label);
        }
        parts.push(format!(
            r##"<rect x="{}" y="{}" width="{}" height="{}" rx="6" fill="#eef6ff" stroke="#93c5fd" />"##,
            RIGHT_X, y, CHANGE_BOX_WIDTH, BOX_HEIGHT
        ));
        parts.push(format!(
            r##"<text x="{}" y="{}" fill="#0f172a">{}</text>"##,
            RIGHT_X + 10,
            y + 16,
            file_label
        ));
        if options.show_summary {
            parts.push(format!(
                r##"<text x="{}" y="{}" fill="#475569">{}</text>"##,
                RIGHT_X + 10,
                y + 30,
                sanitize(Some(&entry.summary))
            ));
        }
    }

    // ── Links ────────────────────────────────────────────────────────
    for (i, entry) in entries.iter().enumerate() {
        let turn = rows
            .get(&entry.conversation.identity_key())
            .copied()
            .unwrap_or(0);
        parts.push(format!(
            r##"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="#94a3b8" stroke-width="1.5" />"##,
            LEFT_X + CONV_BOX_WIDTH,
            row_y(turn) + BOX_HEIGHT / 2,
            RIGHT_X,
            row_y(i) + BOX_HEIGHT / 2
        ));
    }

    parts.push("</svg>".to_string());
    parts.join("\n")
}

/// Read the trace log at `log`, render it, and write the result to `out`.
/// Returns the number of entries drawn.
pub fn render_file(log: &Path, out: &Path, options: &RenderOptions) -> agent_trace::Result<usize> {
    let entries = tracelog::read_entries(log)?;
    let svg = render(&entries, options);
    if let Some(parent) = out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(out, svg)?;
    Ok(entries.len())
}

fn canvas_height(entries: usize, turns: usize, row_height: u32) -> u32 {
    MIN_HEIGHT.max((entries.max(turns) as u32 + 1) * row_height)
}

/// `HH:MM:SS` from an ISO 8601 timestamp.
fn time_of_day(timestamp: &str) -> Option<&str> {
    timestamp
        .split('T')
        .nth(1)
        .map(|t| t.trim_end_matches('Z'))
        .filter(|t| !t.is_empty())
}

/// Escape text for SVG content. Missing or empty text becomes `unknown`.
pub fn sanitize(text: Option<&str>) -> String {
    match text {
        Some(s) if !s.is_empty() => s
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;"),
        _ => "unknown".to_string(),
    }
}
