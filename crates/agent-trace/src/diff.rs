//! Line-level diff summaries.
//!
//! [`compute`] renders a zero-context unified diff with `similar` and hands
//! it to [`parse_unified`], which recovers hunk ranges and added/deleted
//! counts from the text. Parsing fails closed: a malformed `@@` header drops
//! that hunk's range but the rest of the diff is still summarised.

use crate::types::{DiffResult, Hunk};
use similar::TextDiff;
use std::borrow::Cow;
use tracing::debug;

/// Diff two snapshots line by line.
pub fn compute(old: &str, new: &str) -> DiffResult {
    let old = logical_lines(old);
    let new = logical_lines(new);
    let diff = TextDiff::from_lines(old.as_ref(), new.as_ref());
    let unified = diff.unified_diff().context_radius(0).to_string();
    parse_unified(&unified)
}

/// Normalize line endings and terminate the last line, so that a missing
/// final newline is not reported as a change to that line.
fn logical_lines(text: &str) -> Cow<'_, str> {
    let mut text = if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n"))
    } else {
        Cow::Borrowed(text)
    };
    if !text.is_empty() && !text.ends_with('\n') {
        text.to_mut().push('\n');
    }
    text
}

enum HunkBody {
    Outside,
    /// Remaining old/new lines announced by the header.
    Counted { old_left: usize, new_left: usize },
    /// Header was unreadable; count by prefix until the next header.
    Unbounded,
}

/// Summarise unified diff text.
///
/// Lines before the first `@@` header (`---`/`+++` file headers, `diff`
/// lines) are metadata and never counted.
pub fn parse_unified(text: &str) -> DiffResult {
    let mut result = DiffResult::default();
    let mut body = HunkBody::Outside;

    for line in text.lines() {
        if line.starts_with("@@") {
            body = match parse_hunk_header(line) {
                Some(hunk) => {
                    result.hunks.push(hunk);
                    HunkBody::Counted {
                        old_left: hunk.old_lines,
                        new_left: hunk.new_lines,
                    }
                }
                None => {
                    debug!(header = line, "skipping malformed hunk header");
                    HunkBody::Unbounded
                }
            };
            continue;
        }

        match &mut body {
            HunkBody::Outside => {}
            HunkBody::Counted { old_left, new_left } => {
                match line.as_bytes().first() {
                    Some(b'-') if *old_left > 0 => {
                        result.deleted += 1;
                        *old_left -= 1;
                    }
                    Some(b'+') if *new_left > 0 => {
                        result.added += 1;
                        *new_left -= 1;
                    }
                    Some(b' ') => {
                        *old_left = old_left.saturating_sub(1);
                        *new_left = new_left.saturating_sub(1);
                    }
                    _ => {}
                }
                if *old_left == 0 && *new_left == 0 {
                    body = HunkBody::Outside;
                }
            }
            HunkBody::Unbounded => {
                if line.starts_with("+++ ") || line.starts_with("--- ") {
                    body = HunkBody::Outside;
                } else if line.starts_with('+') {
                    result.added += 1;
                } else if line.starts_with('-') {
                    result.deleted += 1;
                }
            }
        }
    }

    result
}

/// Parse `@@ -a[,b] +c[,d] @@`; an omitted length means 1.
fn parse_hunk_header(line: &str) -> Option<Hunk> {
    let inner = line.strip_prefix("@@")?;
    let end = inner.find("@@")?;
    let mut ranges = inner[..end].split_whitespace();
    let (old_start, old_lines) = parse_range(ranges.next()?.strip_prefix('-')?)?;
    let (new_start, new_lines) = parse_range(ranges.next()?.strip_prefix('+')?)?;
    Some(Hunk {
        old_start,
        old_lines,
        new_start,
        new_lines,
    })
}

fn parse_range(range: &str) -> Option<(usize, usize)> {
    match range.split_once(',') {
        Some((start, len)) => Some((start.parse().ok()?, len.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}
