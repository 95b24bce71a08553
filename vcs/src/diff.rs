//! Unified diff hunk parser.
//!
//! Each hunk is turned into two offset-aligned sides so a caller can ask
//! "what was on original line N" with `N - original_start`. A slot holds
//! `Some(text)` when the line changed on that side and `None` when the line
//! is unchanged context.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@")
        .expect("valid hunk header regex")
});

/// One hunk of a unified diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffChunk {
    pub original_start: usize,
    pub original_end: usize,
    pub changes_start: usize,
    pub changes_end: usize,
    pub original: Vec<Option<String>>,
    pub changes: Vec<Option<String>>,
}

impl DiffChunk {
    /// Removed text at 1-based `line` of the original file, if that slot changed.
    #[must_use]
    pub fn original_line(&self, line: usize) -> Option<&str> {
        let offset = line.checked_sub(self.original_start)?;
        self.original.get(offset)?.as_deref()
    }

    /// Added text at 1-based `line` of the changed file, if that slot changed.
    #[must_use]
    pub fn changed_line(&self, line: usize) -> Option<&str> {
        let offset = line.checked_sub(self.changes_start)?;
        self.changes.get(offset)?.as_deref()
    }
}

/// A parsed diff: hunks in file order, never overlapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diff {
    pub chunks: Vec<DiffChunk>,
}

impl Diff {
    /// The hunk whose changed side covers 1-based `line`.
    #[must_use]
    pub fn chunk_for_changed_line(&self, line: usize) -> Option<&DiffChunk> {
        self.chunks
            .iter()
            .find(|c| line >= c.changes_start && line < c.changes_end.max(c.changes_start + 1))
    }
}

/// Parse unified diff text.
///
/// Returns `None` for empty input or when no hunk header is found.
#[must_use]
pub fn parse_diff(data: &str) -> Option<Diff> {
    if data.trim().is_empty() {
        return None;
    }

    let headers: Vec<_> = HUNK_HEADER.captures_iter(data).collect();
    let mut chunks = Vec::with_capacity(headers.len());

    for (i, caps) in headers.iter().enumerate() {
        let (Some(whole), Some(original_start), Some(changes_start)) = (
            caps.get(0),
            number(caps.get(1)),
            number(caps.get(3)),
        ) else {
            continue;
        };
        let original_len = number(caps.get(2)).unwrap_or(1);
        let changes_len = number(caps.get(4)).unwrap_or(1);

        let body_end = headers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(data.len(), |m| m.start());
        let body = &data[whole.end()..body_end];

        let mut original = Vec::new();
        let mut changes = Vec::new();
        // The first piece is the remainder of the header line (function context).
        for line in body.lines().skip(1) {
            if line.starts_with("diff ") {
                break;
            }
            if let Some(removed) = line.strip_prefix('-') {
                original.push(Some(removed.to_string()));
            } else if let Some(added) = line.strip_prefix('+') {
                changes.push(Some(added.to_string()));
            } else if line.starts_with('\\') {
                // "\ No newline at end of file"
            } else {
                original.push(None);
                changes.push(None);
            }
        }

        chunks.push(DiffChunk {
            original_start,
            original_end: original_start + original_len,
            changes_start,
            changes_end: changes_start + changes_len,
            original,
            changes,
        });
    }

    if chunks.is_empty() {
        tracing::trace!("diff output contained no hunks");
        return None;
    }
    Some(Diff { chunks })
}

fn number(m: Option<regex::Match<'_>>) -> Option<usize> {
    m?.as_str().parse().ok()
}
