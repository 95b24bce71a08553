//! `git stash list` parser for the format emitted by [`crate::args::stash_list_args`].

use serde::Serialize;

use crate::commit::{Commit, CommitKind, parse_iso_date};
use crate::entries::parse_entries;
use crate::log::FileStatus;

/// One stash entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StashCommit {
    #[serde(flatten)]
    pub commit: Commit,
    /// Reflog selector, e.g. `stash@{0}`.
    pub stash_name: String,
    pub file_statuses: Vec<FileStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stash {
    pub repo_path: String,
    pub commits: Vec<StashCommit>,
}

impl Stash {
    #[must_use]
    pub fn by_name(&self, stash_name: &str) -> Option<&StashCommit> {
        self.commits.iter().find(|c| c.stash_name == stash_name)
    }
}

/// Parse stash listing output; `None` when there are no stashes.
#[must_use]
pub fn parse_stash(data: &str, repo_path: &str) -> Option<Stash> {
    let commits: Vec<StashCommit> = parse_entries(data)
        .into_iter()
        .map(|raw| {
            let file_statuses: Vec<FileStatus> =
                raw.statuses.iter().map(FileStatus::from_raw).collect();
            let file_name = file_statuses
                .iter()
                .map(|f| f.file_name.as_str())
                .collect::<Vec<_>>()
                .join(", ");

            let mut commit = Commit::new(CommitKind::Stash, repo_path, &raw.sha, &file_name);
            commit.author = raw.author.unwrap_or_default();
            commit.date = raw.date.as_deref().and_then(parse_iso_date);
            commit.message = raw.message;

            StashCommit {
                commit,
                stash_name: raw.reflog_selector.unwrap_or_default(),
                file_statuses,
            }
        })
        .collect();

    if commits.is_empty() {
        return None;
    }
    Some(Stash {
        repo_path: repo_path.to_string(),
        commits,
    })
}
