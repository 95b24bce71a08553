//! Argument lists for the git invocations whose output this crate parses.
//!
//! Each builder returns the arguments after `git`; callers run them in the
//! repository root and feed stdout to the matching parser.

use std::fmt;

use crate::commit::LineRange;

/// Keyed record format understood by [`crate::log::parse_log`].
pub const LOG_FORMAT: &str =
    "--format=%H -%nauthor %an%nauthor-date %ai%nparents %P%nsummary %B%nfilename ?";

/// Keyed record format understood by [`crate::stash::parse_stash`].
pub const STASH_FORMAT: &str =
    "--format=%H -%nauthor-date %ai%nreflog-selector %gd%nsummary %B%nfilename ?";

/// Porcelain v2 appeared in git 2.11.
const PORCELAIN_V2_SINCE: (u32, u32) = (2, 11);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PorcelainVersion {
    V1,
    V2,
}

/// Version reported by `git --version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GitVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl GitVersion {
    /// Parse `git version 2.13.0` (platform suffixes such as
    /// `.windows.1` or ` (Apple Git-101)` are ignored).
    #[must_use]
    pub fn parse(output: &str) -> Option<Self> {
        let rest = output.trim().strip_prefix("git version ")?;
        let version = rest.split_whitespace().next()?;
        let mut parts = version.split('.').map(|p| p.parse::<u32>().ok());
        let major = parts.next()??;
        let minor = parts.next().flatten().unwrap_or(0);
        let patch = parts.next().flatten().unwrap_or(0);
        Some(Self { major, minor, patch })
    }

    #[must_use]
    pub fn at_least(self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

impl fmt::Display for GitVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[must_use]
pub fn porcelain_version_for(version: GitVersion) -> PorcelainVersion {
    let (major, minor) = PORCELAIN_V2_SINCE;
    if version.at_least(major, minor) {
        PorcelainVersion::V2
    } else {
        PorcelainVersion::V1
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| (*s).to_string()).collect()
}

/// `git blame --porcelain`, optionally restricted to a 0-based closed range.
#[must_use]
pub fn blame_args(file: &str, sha: Option<&str>, range: Option<LineRange>) -> Vec<String> {
    let mut args = strings(&["blame", "--root", "--porcelain"]);
    if let Some(range) = range {
        args.push(format!("-L{},{}", range.start + 1, range.end + 1));
    }
    args.extend(sha.map(str::to_string));
    args.push("--".to_string());
    args.push(file.to_string());
    args
}

/// `git diff` of one file between two revisions (or the work tree).
#[must_use]
pub fn diff_args(file: &str, sha1: Option<&str>, sha2: Option<&str>) -> Vec<String> {
    let mut args = strings(&["diff", "--diff-filter=M", "-M"]);
    args.extend(sha1.map(str::to_string));
    args.extend(sha2.map(str::to_string));
    args.push("--".to_string());
    args.push(file.to_string());
    args
}

fn log_base(max_count: Option<usize>, name_status: bool) -> Vec<String> {
    let mut args = strings(&["log"]);
    if name_status {
        args.push("--name-status".to_string());
    }
    args.extend(strings(&["--full-history", "-M", LOG_FORMAT]));
    if let Some(n) = max_count.filter(|&n| n > 0) {
        args.push(format!("-n{n}"));
    }
    args
}

/// Branch history starting at `sha` (or `HEAD`).
///
/// In reverse mode the log walks forward from `sha` to `HEAD`.
#[must_use]
pub fn log_args(sha: Option<&str>, max_count: Option<usize>, reverse: bool) -> Vec<String> {
    let mut args = log_base(max_count, true);
    push_revision(&mut args, sha, reverse);
    args
}

fn push_revision(args: &mut Vec<String>, sha: Option<&str>, reverse: bool) {
    match (sha, reverse) {
        (Some(sha), true) => {
            args.push("--reverse".to_string());
            args.push("--ancestry-path".to_string());
            args.push(format!("{sha}..HEAD"));
        }
        (Some(sha), false) => args.push(sha.to_string()),
        (None, _) => {}
    }
}

/// History of one file, following renames unless a line range is given.
#[must_use]
pub fn log_file_args(
    file: &str,
    sha: Option<&str>,
    max_count: Option<usize>,
    reverse: bool,
    range: Option<LineRange>,
) -> Vec<String> {
    // -L only supports patch output, so name-status is dropped with it.
    let mut args = log_base(max_count, range.is_none());
    push_revision(&mut args, sha, reverse);
    match range {
        Some(range) => {
            args.push(format!("-L{},{}:{file}", range.start + 1, range.end + 1));
        }
        None => {
            if !reverse {
                args.push("--follow".to_string());
            }
            args.push("--".to_string());
            args.push(file.to_string());
        }
    }
    args
}

#[must_use]
pub fn status_args(version: PorcelainVersion, file: Option<&str>) -> Vec<String> {
    let porcelain = match version {
        PorcelainVersion::V1 => "--porcelain",
        PorcelainVersion::V2 => "--porcelain=v2",
    };
    let mut args = strings(&["status", porcelain, "--branch"]);
    if let Some(file) = file {
        args.push("--".to_string());
        args.push(file.to_string());
    }
    args
}

#[must_use]
pub fn stash_list_args() -> Vec<String> {
    strings(&["stash", "list", "--name-status", "--full-history", "-M", STASH_FORMAT])
}

#[must_use]
pub fn branch_args(all: bool) -> Vec<String> {
    if all {
        strings(&["branch", "-a"])
    } else {
        strings(&["branch"])
    }
}

#[must_use]
pub fn remote_args() -> Vec<String> {
    strings(&["remote", "-v"])
}
