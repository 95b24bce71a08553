//! Commit records shared by the blame, log and stash parsers.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

/// Sha git reports for lines that are not committed yet.
pub const UNCOMMITTED_SHA: &str = "0000000000000000000000000000000000000000";

/// Length of the abbreviated sha shown to users.
const SHORT_SHA_LEN: usize = 8;

/// Which command produced a [`Commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitKind {
    Blame,
    Branch,
    File,
    Stash,
}

/// A closed, 0-based line range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn contains(self, line: usize) -> bool {
        line >= self.start && line <= self.end
    }
}

/// Attribution of one line of the current file revision to a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlameLine {
    pub sha: String,
    /// 0-based line in the current revision.
    pub line: usize,
    /// 0-based line in the commit that introduced it.
    pub original_line: usize,
}

/// A commit as reconstructed from git output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub kind: CommitKind,
    pub repo_path: String,
    pub sha: String,
    pub file_name: String,
    pub author: String,
    pub date: Option<DateTime<FixedOffset>>,
    pub message: String,
    /// Lines owned by this commit. Only populated for blame commits.
    pub lines: Vec<BlameLine>,
    pub original_file_name: Option<String>,
    pub previous_sha: Option<String>,
    pub previous_file_name: Option<String>,
}

impl Commit {
    pub(crate) fn new(kind: CommitKind, repo_path: &str, sha: &str, file_name: &str) -> Self {
        Self {
            kind,
            repo_path: repo_path.to_string(),
            sha: sha.to_string(),
            file_name: file_name.to_string(),
            author: String::new(),
            date: None,
            message: String::new(),
            lines: Vec::new(),
            original_file_name: None,
            previous_sha: None,
            previous_file_name: None,
        }
    }

    #[must_use]
    pub fn is_uncommitted(&self) -> bool {
        self.sha == UNCOMMITTED_SHA
    }

    #[must_use]
    pub fn short_sha(&self) -> &str {
        short_sha(&self.sha)
    }

    /// Name of the file in the commit before this one.
    #[must_use]
    pub fn previous_file_name_or_current(&self) -> &str {
        self.previous_file_name
            .as_deref()
            .or(self.original_file_name.as_deref())
            .unwrap_or(&self.file_name)
    }
}

#[must_use]
pub fn short_sha(sha: &str) -> &str {
    sha.get(..SHORT_SHA_LEN).unwrap_or(sha)
}

/// Whether `s` is a full 40-character hex object id.
pub(crate) fn is_full_sha(s: &str) -> bool {
    s.len() == 40 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Parse a `+hhmm`/`-hhmm` timezone as emitted by `author-tz` and `%ai`.
pub(crate) fn parse_tz_offset(tz: &str) -> Option<FixedOffset> {
    let (sign, digits) = match tz.as_bytes().first()? {
        b'+' => (1, &tz[1..]),
        b'-' => (-1, &tz[1..]),
        _ => (1, tz),
    };
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Parse an ISO-like date as emitted by `%ai`: `2017-03-01 12:00:00 +0100`.
pub(crate) fn parse_iso_date(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S %z").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_sha_truncates() {
        assert_eq!(short_sha("0123456789abcdef0123456789abcdef01234567"), "01234567");
        assert_eq!(short_sha("abc"), "abc");
    }

    #[test]
    fn full_sha_detection() {
        assert!(is_full_sha(UNCOMMITTED_SHA));
        assert!(!is_full_sha("0123"));
        assert!(!is_full_sha("zz23456789abcdef0123456789abcdef01234567"));
    }

    #[test]
    fn tz_offsets() {
        assert_eq!(parse_tz_offset("+0100").unwrap().local_minus_utc(), 3600);
        assert_eq!(parse_tz_offset("-0530").unwrap().local_minus_utc(), -(5 * 3600 + 30 * 60));
        assert!(parse_tz_offset("bogus").is_none());
    }

    #[test]
    fn iso_dates() {
        let date = parse_iso_date("2017-03-01 12:00:00 +0100").unwrap();
        assert_eq!(date.offset().local_minus_utc(), 3600);
        assert!(parse_iso_date("yesterday").is_none());
    }

    #[test]
    fn previous_file_name_falls_back() {
        let mut commit = Commit::new(CommitKind::File, "/repo", UNCOMMITTED_SHA, "src/new.rs");
        assert!(commit.is_uncommitted());
        assert_eq!(commit.previous_file_name_or_current(), "src/new.rs");
        commit.original_file_name = Some("src/old.rs".to_string());
        assert_eq!(commit.previous_file_name_or_current(), "src/old.rs");
    }

    #[test]
    fn line_range_is_closed() {
        let range = LineRange::new(2, 4);
        assert!(range.contains(2));
        assert!(range.contains(4));
        assert!(!range.contains(5));
    }
}
