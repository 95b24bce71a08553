//! `git status --porcelain` parser, v1 and v2.
//!
//! v1 is requested with `--branch` so the first line carries the upstream
//! tracking state; v2 adds `--branch` headers of the form `# branch.<key>`.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::args::PorcelainVersion;

static V1_BRANCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^## (?:No commits yet on |Initial commit on )?(.+?)(?:\.\.\.(\S+))?(?: \[(.+)\])?$")
        .expect("valid v1 branch regex")
});
static AHEAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ahead (\d+)").expect("valid ahead regex"));
static BEHIND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"behind (\d+)").expect("valid behind regex"));

/// One changed path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusFile {
    pub file_name: String,
    pub original_file_name: Option<String>,
    /// Index (staged) status letter.
    pub index_status: Option<char>,
    /// Work tree status letter.
    pub work_tree_status: Option<char>,
}

impl StatusFile {
    #[must_use]
    pub fn is_staged(&self) -> bool {
        self.index_status.is_some_and(|c| c != '?' && c != '!')
    }

    #[must_use]
    pub fn is_untracked(&self) -> bool {
        self.work_tree_status == Some('?')
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub repo_path: String,
    pub branch: Option<String>,
    pub sha: Option<String>,
    pub upstream: Option<String>,
    pub ahead: usize,
    pub behind: usize,
    pub files: Vec<StatusFile>,
}

/// Parse porcelain status output. Returns `None` for empty input.
#[must_use]
pub fn parse_status(data: &str, repo_path: &str, version: PorcelainVersion) -> Option<Status> {
    if data.trim().is_empty() {
        return None;
    }

    let mut status = Status {
        repo_path: repo_path.to_string(),
        ..Status::default()
    };
    for line in data.lines().filter(|l| !l.is_empty()) {
        match version {
            PorcelainVersion::V1 => parse_v1_line(line, &mut status),
            PorcelainVersion::V2 => parse_v2_line(line, &mut status),
        }
    }
    Some(status)
}

fn status_letter(c: char) -> Option<char> {
    match c {
        ' ' | '.' => None,
        other => Some(other),
    }
}

fn parse_v1_line(line: &str, status: &mut Status) {
    if line.starts_with("## ") {
        if let Some(caps) = V1_BRANCH.captures(line) {
            status.branch = caps.get(1).map(|m| m.as_str().to_string());
            status.upstream = caps.get(2).map(|m| m.as_str().to_string());
            if let Some(tracking) = caps.get(3).map(|m| m.as_str()) {
                status.ahead = count(&AHEAD, tracking);
                status.behind = count(&BEHIND, tracking);
            }
        }
        return;
    }

    let mut chars = line.chars();
    let (Some(x), Some(y), Some(' ')) = (chars.next(), chars.next(), chars.next()) else {
        tracing::trace!(line, "unrecognised porcelain v1 line");
        return;
    };
    let path = chars.as_str();
    let (original_file_name, file_name) = match path.split_once(" -> ") {
        Some((from, to)) => (Some(from.to_string()), to.to_string()),
        None => (None, path.to_string()),
    };
    status.files.push(StatusFile {
        file_name,
        original_file_name,
        index_status: status_letter(x),
        work_tree_status: status_letter(y),
    });
}

fn parse_v2_line(line: &str, status: &mut Status) {
    if let Some(header) = line.strip_prefix("# ") {
        let (key, value) = header.split_once(' ').unwrap_or((header, ""));
        match key {
            "branch.oid" if value != "(initial)" => status.sha = Some(value.to_string()),
            "branch.head" if value != "(detached)" => status.branch = Some(value.to_string()),
            "branch.upstream" => status.upstream = Some(value.to_string()),
            "branch.ab" => {
                for part in value.split_whitespace() {
                    if let Some(n) = part.strip_prefix('+') {
                        status.ahead = n.parse().unwrap_or(0);
                    } else if let Some(n) = part.strip_prefix('-') {
                        status.behind = n.parse().unwrap_or(0);
                    }
                }
            }
            _ => {}
        }
        return;
    }

    let file = if let Some(path) = line.strip_prefix("? ") {
        Some(StatusFile {
            file_name: path.to_string(),
            original_file_name: None,
            index_status: Some('?'),
            work_tree_status: Some('?'),
        })
    } else if let Some(rest) = line.strip_prefix("1 ") {
        // XY sub mH mI mW hH hI path
        tracked_entry(rest, 7).map(|(xy, path)| entry(xy, path, None))
    } else if let Some(rest) = line.strip_prefix("2 ") {
        // XY sub mH mI mW hH hI Xscore path\torigPath
        tracked_entry(rest, 8).map(|(xy, paths)| match paths.split_once('\t') {
            Some((path, orig)) => entry(xy, path, Some(orig)),
            None => entry(xy, paths, None),
        })
    } else if let Some(rest) = line.strip_prefix("u ") {
        // XY sub m1 m2 m3 mW h1 h2 h3 path
        tracked_entry(rest, 9).map(|(xy, path)| entry(xy, path, None))
    } else {
        None
    };

    match file {
        Some(file) => status.files.push(file),
        None => tracing::trace!(line, "unrecognised porcelain v2 line"),
    }
}

/// Split off `fields` space-separated fields and return `(XY, remainder)`.
fn tracked_entry(rest: &str, fields: usize) -> Option<(&str, &str)> {
    let mut parts = rest.splitn(fields + 1, ' ');
    let xy = parts.next()?;
    let path = parts.nth(fields - 1)?;
    Some((xy, path))
}

fn entry(xy: &str, path: &str, original: Option<&str>) -> StatusFile {
    let mut letters = xy.chars();
    StatusFile {
        file_name: path.to_string(),
        original_file_name: original.map(str::to_string),
        index_status: letters.next().and_then(status_letter),
        work_tree_status: letters.next().and_then(status_letter),
    }
}

fn count(re: &Regex, text: &str) -> usize {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}
