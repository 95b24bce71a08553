//! `git blame --porcelain` parser.
//!
//! Porcelain output carries one header per file line:
//!
//! ```text
//! <sha> <original line> <final line> [<group size>]
//! ```
//!
//! The group size only appears on the first line of a run attributed to the
//! same commit. Commit metadata (`author`, `author-time`, `summary`, ...)
//! follows the first header that mentions a sha and ends with `filename`;
//! later headers for that sha carry no metadata and only add lines.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::commit::{
    BlameLine, Commit, CommitKind, LineRange, UNCOMMITTED_SHA, is_full_sha, parse_tz_offset,
};

/// Per-author line count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlameAuthor {
    pub name: String,
    pub line_count: usize,
}

/// Parsed blame for one file.
///
/// `authors` and `commits` keep first-appearance order; `lines` holds exactly
/// one entry per file line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Blame {
    authors: Vec<BlameAuthor>,
    commits: Vec<Commit>,
    lines: Vec<BlameLine>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Blame {
    fn new(authors: Vec<BlameAuthor>, commits: Vec<Commit>, lines: Vec<BlameLine>) -> Self {
        let index = commits
            .iter()
            .enumerate()
            .map(|(i, c)| (c.sha.clone(), i))
            .collect();
        Self {
            authors,
            commits,
            lines,
            index,
        }
    }

    #[must_use]
    pub fn authors(&self) -> &[BlameAuthor] {
        &self.authors
    }

    #[must_use]
    pub fn author(&self, name: &str) -> Option<&BlameAuthor> {
        self.authors.iter().find(|a| a.name == name)
    }

    #[must_use]
    pub fn commits(&self) -> &[Commit] {
        &self.commits
    }

    #[must_use]
    pub fn commit(&self, sha: &str) -> Option<&Commit> {
        self.index.get(sha).map(|&i| &self.commits[i])
    }

    #[must_use]
    pub fn lines(&self) -> &[BlameLine] {
        &self.lines
    }

    /// Commit that last touched 0-based `line`.
    #[must_use]
    pub fn commit_for_line(&self, line: usize) -> Option<&Commit> {
        self.commit(&self.lines.get(line)?.sha)
    }

    /// Restrict the blame to the closed line range `[start, end]`.
    ///
    /// A range covering the whole file returns the blame unchanged. Otherwise
    /// only commits touching the range survive, each keeping only its
    /// in-range lines, and authors are re-counted and sorted by descending
    /// line count (ties keep first-seen order).
    #[must_use]
    pub fn for_range(&self, start: usize, end: usize) -> RangedBlame {
        let all_lines = self.lines.clone();
        if self.lines.is_empty() || (start == 0 && end >= self.lines.len() - 1) {
            return RangedBlame {
                blame: self.clone(),
                all_lines,
            };
        }

        let range = LineRange::new(start, end.min(self.lines.len() - 1));
        let lines: Vec<BlameLine> = self
            .lines
            .get(range.start..=range.end)
            .map(<[BlameLine]>::to_vec)
            .unwrap_or_default();
        let referenced: HashSet<&str> =
            lines.iter().map(|l| l.sha.as_str()).collect();

        let mut authors: Vec<BlameAuthor> = Vec::new();
        let mut commits = Vec::new();
        for commit in self.commits.iter().filter(|c| referenced.contains(c.sha.as_str())) {
            let mut filtered = commit.clone();
            filtered.lines.retain(|l| range.contains(l.line));
            match authors.iter_mut().find(|a| a.name == filtered.author) {
                Some(author) => author.line_count += filtered.lines.len(),
                None => authors.push(BlameAuthor {
                    name: filtered.author.clone(),
                    line_count: filtered.lines.len(),
                }),
            }
            commits.push(filtered);
        }
        authors.sort_by(|a, b| b.line_count.cmp(&a.line_count));

        RangedBlame {
            blame: Blame::new(authors, commits, lines),
            all_lines,
        }
    }
}

/// A blame restricted to a line range, plus the unfiltered lines so callers
/// can map back to absolute positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangedBlame {
    pub blame: Blame,
    pub all_lines: Vec<BlameLine>,
}

/// A commit whose metadata block is still being read.
struct PendingCommit {
    commit: Commit,
    author_time: Option<i64>,
    author_tz: Option<FixedOffset>,
    complete: bool,
}

impl PendingCommit {
    fn finish(mut self) -> Commit {
        self.commit.date = self.author_time.and_then(|secs| {
            let offset = self.author_tz.or_else(|| FixedOffset::east_opt(0))?;
            DateTime::from_timestamp(secs, 0).map(|utc| utc.with_timezone(&offset))
        });
        self.commit
    }
}

/// Parse `git blame --porcelain` output for `file_name` in `repo_path`.
///
/// Returns `None` for empty input or when no header line is found.
#[must_use]
pub fn parse_blame(data: &str, repo_path: &str, file_name: &str) -> Option<Blame> {
    if data.trim().is_empty() {
        return None;
    }

    let mut pending: Vec<PendingCommit> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut lines: Vec<BlameLine> = Vec::new();
    let mut current: Option<usize> = None;

    for raw in data.lines() {
        if raw.starts_with('\t') {
            continue;
        }
        let (key, rest) = raw.split_once(' ').unwrap_or((raw, ""));

        if is_full_sha(key) {
            let mut fields = rest.split_whitespace().map(str::parse::<usize>);
            let (Some(Ok(original)), Some(Ok(fin))) = (fields.next(), fields.next()) else {
                tracing::trace!("skipping malformed blame header: {raw}");
                current = None;
                continue;
            };
            let slot = *index.entry(key.to_string()).or_insert_with(|| {
                pending.push(PendingCommit {
                    commit: Commit::new(CommitKind::Blame, repo_path, key, file_name),
                    author_time: None,
                    author_tz: None,
                    complete: false,
                });
                pending.len() - 1
            });
            let line = BlameLine {
                sha: key.to_string(),
                line: fin.saturating_sub(1),
                original_line: original.saturating_sub(1),
            };
            pending[slot].commit.lines.push(line.clone());
            lines.push(line);
            current = Some(slot);
            continue;
        }

        let Some(slot) = current else { continue };
        let entry = &mut pending[slot];
        if entry.complete {
            continue;
        }
        match key {
            "author" => entry.commit.author = rest.to_string(),
            "author-time" => entry.author_time = rest.trim().parse().ok(),
            "author-tz" => entry.author_tz = parse_tz_offset(rest.trim()),
            "summary" => entry.commit.message = rest.to_string(),
            "previous" if entry.commit.sha != UNCOMMITTED_SHA => {
                if let Some((sha, previous_file)) = rest.split_once(' ') {
                    entry.commit.previous_sha = Some(sha.to_string());
                    entry.commit.previous_file_name = Some(previous_file.to_string());
                }
            }
            "filename" => {
                if rest != file_name {
                    entry.commit.original_file_name = Some(rest.to_string());
                }
                entry.complete = true;
            }
            _ => {}
        }
    }

    if lines.is_empty() {
        return None;
    }
    lines.sort_by_key(|l| l.line);

    let commits: Vec<Commit> = pending.into_iter().map(PendingCommit::finish).collect();
    let mut authors: Vec<BlameAuthor> = Vec::new();
    for line in &lines {
        let author = &commits[index[&line.sha]].author;
        match authors.iter_mut().find(|a| &a.name == author) {
            Some(entry) => entry.line_count += 1,
            None => authors.push(BlameAuthor {
                name: author.clone(),
                line_count: 1,
            }),
        }
    }

    Some(Blame::new(authors, commits, lines))
}
