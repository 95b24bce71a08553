//! `git log` parser for the keyed format emitted by [`crate::args::log_args`]
//! and [`crate::args::log_file_args`].
//!
//! Commits are linked to their chronological neighbours at parse time so a
//! caller can page through history with `previous_sha`/`next_sha` without
//! re-running git.

use std::collections::HashMap;

use serde::Serialize;

use crate::commit::{Commit, CommitKind, LineRange, parse_iso_date};
use crate::entries::{RawEntry, RawStatus, parse_entries};

/// Whether the log covers a whole branch or a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogScope {
    Branch,
    File,
}

/// Change kind reported by `--name-status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatusKind {
    Added,
    Copied,
    Deleted,
    Modified,
    Renamed,
    TypeChanged,
    Unmerged,
    Unknown,
}

impl FileStatusKind {
    #[must_use]
    pub fn from_code(code: char) -> Self {
        match code {
            'A' => Self::Added,
            'C' => Self::Copied,
            'D' => Self::Deleted,
            'M' => Self::Modified,
            'R' => Self::Renamed,
            'T' => Self::TypeChanged,
            'U' => Self::Unmerged,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn code(self) -> char {
        match self {
            Self::Added => 'A',
            Self::Copied => 'C',
            Self::Deleted => 'D',
            Self::Modified => 'M',
            Self::Renamed => 'R',
            Self::TypeChanged => 'T',
            Self::Unmerged => 'U',
            Self::Unknown => 'X',
        }
    }
}

/// One file touched by a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStatus {
    pub status: FileStatusKind,
    pub file_name: String,
    pub original_file_name: Option<String>,
}

impl FileStatus {
    pub(crate) fn from_raw(raw: &RawStatus) -> Self {
        Self {
            status: FileStatusKind::from_code(raw.code),
            file_name: raw.file_name.clone(),
            original_file_name: raw.original_file_name.clone(),
        }
    }
}

/// A commit from `git log`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogCommit {
    #[serde(flatten)]
    pub commit: Commit,
    pub parent_shas: Vec<String>,
    pub next_sha: Option<String>,
    pub next_file_name: Option<String>,
    /// Status of `commit.file_name` in this commit (file scope only).
    pub status: Option<FileStatusKind>,
    pub file_statuses: Vec<FileStatus>,
}

/// Inputs that shaped the log command, needed to interpret its output.
#[derive(Debug, Clone, Copy)]
pub struct LogParams<'a> {
    pub scope: LogScope,
    pub repo_path: &'a str,
    pub file_name: Option<&'a str>,
    pub sha: Option<&'a str>,
    pub max_count: Option<usize>,
    pub reverse: bool,
    pub range: Option<LineRange>,
}

impl<'a> LogParams<'a> {
    #[must_use]
    pub fn branch(repo_path: &'a str) -> Self {
        Self {
            scope: LogScope::Branch,
            repo_path,
            file_name: None,
            sha: None,
            max_count: None,
            reverse: false,
            range: None,
        }
    }

    #[must_use]
    pub fn file(repo_path: &'a str, file_name: &'a str) -> Self {
        Self {
            scope: LogScope::File,
            file_name: Some(file_name),
            ..Self::branch(repo_path)
        }
    }
}

/// Parsed history, most recent first unless parsed in reverse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub repo_path: String,
    commits: Vec<LogCommit>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    pub sha: Option<String>,
    pub max_count: Option<usize>,
    pub range: Option<LineRange>,
    /// Set when the command may have been cut off by `max_count`.
    pub truncated: bool,
}

impl Log {
    #[must_use]
    pub fn commits(&self) -> &[LogCommit] {
        &self.commits
    }

    #[must_use]
    pub fn commit(&self, sha: &str) -> Option<&LogCommit> {
        self.index.get(sha).map(|&i| &self.commits[i])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }
}

/// Parse `git log` output.
///
/// `truncated` is set whenever exactly `max_count` commits were parsed: the
/// output alone cannot tell "exactly N commits exist" from "more exist".
#[must_use]
pub fn parse_log(data: &str, params: LogParams<'_>) -> Option<Log> {
    if data.trim().is_empty() {
        return None;
    }

    let mut commits: Vec<LogCommit> = Vec::new();
    let mut index = HashMap::new();
    for raw in parse_entries(data) {
        if index.contains_key(&raw.sha) {
            tracing::trace!(sha = %raw.sha, "duplicate commit in log output");
            continue;
        }
        index.insert(raw.sha.clone(), commits.len());
        commits.push(build_commit(raw, &params));
    }

    if commits.is_empty() {
        return None;
    }

    link_neighbours(&mut commits, params.reverse);

    let truncated = params.max_count.is_some_and(|max| commits.len() == max);
    Some(Log {
        repo_path: params.repo_path.to_string(),
        commits,
        index,
        sha: params.sha.map(str::to_string),
        max_count: params.max_count,
        range: params.range,
        truncated,
    })
}

fn build_commit(raw: RawEntry, params: &LogParams<'_>) -> LogCommit {
    let file_statuses: Vec<FileStatus> = raw.statuses.iter().map(FileStatus::from_raw).collect();

    let (kind, file_name, original_file_name, status) = match params.scope {
        LogScope::Branch => {
            let names: Vec<&str> = file_statuses.iter().map(|f| f.file_name.as_str()).collect();
            (CommitKind::Branch, names.join(", "), None, None)
        }
        LogScope::File => {
            let known = params.file_name.unwrap_or_default();
            match file_statuses.first() {
                Some(status) => (
                    CommitKind::File,
                    status.file_name.clone(),
                    status.original_file_name.clone(),
                    Some(status.status),
                ),
                None => (
                    CommitKind::File,
                    known.to_string(),
                    None,
                    Some(FileStatusKind::Modified),
                ),
            }
        }
    };

    let mut commit = Commit::new(kind, params.repo_path, &raw.sha, &file_name);
    commit.author = raw.author.unwrap_or_default();
    commit.date = raw.date.as_deref().and_then(parse_iso_date);
    commit.message = raw.message;
    commit.original_file_name = original_file_name;

    LogCommit {
        commit,
        parent_shas: raw.parents,
        next_sha: None,
        next_file_name: None,
        status,
        file_statuses,
    }
}

/// In git's default order the next commit in the output is the older one;
/// `--reverse` flips that.
fn link_neighbours(commits: &mut [LogCommit], reverse: bool) {
    for i in 1..commits.len() {
        let (newer, older) = if reverse { (i, i - 1) } else { (i - 1, i) };

        let older_sha = commits[older].commit.sha.clone();
        let older_file = commits[older].commit.file_name.clone();
        let newer_sha = commits[newer].commit.sha.clone();
        let newer_file = commits[newer].commit.file_name.clone();

        let newer = &mut commits[newer];
        newer.commit.previous_sha = Some(older_sha);
        newer.commit.previous_file_name = Some(older_file);

        let older = &mut commits[older];
        older.next_sha = Some(newer_sha);
        older.next_file_name = Some(newer_file);
    }
}
