//! Lookup of the latest turn in an external JSONL conversation log.
//!
//! Logs come from different recorders and disagree on field names, so each
//! record is normalized into a [`ConversationRef`]:
//!
//! | field        | taken from (first present wins) |
//! |--------------|---------------------------------|
//! | `id`         | `conversation_id`, `id`         |
//! | `message_id` | `message_id`, `id`              |
//! | `role`       | `role`                          |
//! | `created_at` | `created_at`, `timestamp`       |
//! | `excerpt`    | `content` (string or list)      |
//!
//! Nothing here returns an error: a missing log, an unreadable log, or a log
//! with no usable record all produce an empty reference.

use crate::types::ConversationRef;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// Maximum excerpt length, in characters.
pub const EXCERPT_CHARS: usize = 140;

/// The most recent parseable record in `log`.
pub fn latest(log: Option<&Path>) -> ConversationRef {
    snapshot(log, 0).0
}

/// The last `n` parseable records in `log`, oldest first.
pub fn recent(log: Option<&Path>, n: usize) -> Vec<ConversationRef> {
    if n == 0 {
        return Vec::new();
    }
    snapshot(log, n).1
}

/// The latest record and the last `n` records, from a single read of `log`.
/// The latest record is always the last element of a non-empty window.
pub fn snapshot(log: Option<&Path>, n: usize) -> (ConversationRef, Vec<ConversationRef>) {
    let mut all = records(log);
    let latest = all.last().cloned().unwrap_or_default();
    let skip = all.len().saturating_sub(n);
    (latest, all.split_off(skip))
}

fn records(log: Option<&Path>) -> Vec<ConversationRef> {
    let Some(path) = log else {
        return Vec::new();
    };
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(path = %path.display(), "conversation log unavailable: {}", e);
            return Vec::new();
        }
    };
    String::from_utf8_lossy(&bytes)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter_map(|value| normalize(&value))
        .collect()
}

/// Map one record onto the common shape. Non-object records are rejected.
pub fn normalize(record: &Value) -> Option<ConversationRef> {
    let obj = record.as_object()?;
    let field = |keys: &[&str]| {
        keys.iter()
            .filter_map(|k| obj.get(*k))
            .find_map(scalar_to_string)
    };
    Some(ConversationRef {
        id: field(&["conversation_id", "id"]),
        message_id: field(&["message_id", "id"]),
        role: field(&["role"]),
        created_at: field(&["created_at", "timestamp"]),
        excerpt: obj.get("content").and_then(excerpt),
    })
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Flatten content to one line and cap it at [`EXCERPT_CHARS`].
fn excerpt(content: &Value) -> Option<String> {
    let text = match content {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(content_part_text)
            .collect::<Vec<_>>()
            .join(" "),
        _ => return None,
    };
    let flat: String = text
        .trim()
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .take(EXCERPT_CHARS)
        .collect();
    if flat.is_empty() { None } else { Some(flat) }
}

/// Text of one list item: strings as-is, `{"text": …}` parts by their text,
/// anything else as compact JSON.
fn content_part_text(item: &Value) -> String {
    match item {
        Value::String(s) => s.clone(),
        Value::Object(obj) => match obj.get("text") {
            Some(Value::String(text)) => text.clone(),
            _ => item.to_string(),
        },
        other => other.to_string(),
    }
}
