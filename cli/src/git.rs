//! `codelens git ...`: parse git output read from stdin into JSON, or print
//! the git arguments that produce that output.

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand, ValueEnum};
use codelens_vcs::args::{
    blame_args, branch_args, diff_args, log_args, log_file_args, porcelain_version_for,
    remote_args, stash_list_args, status_args,
};
use codelens_vcs::{
    GitVersion, LineRange, LogParams, PorcelainVersion, parse_blame, parse_branches, parse_diff,
    parse_log, parse_remotes, parse_stash, parse_status,
};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Porcelain {
    V1,
    V2,
}

impl From<Porcelain> for PorcelainVersion {
    fn from(p: Porcelain) -> Self {
        match p {
            Porcelain::V1 => Self::V1,
            Porcelain::V2 => Self::V2,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct Common {
    /// Print the git arguments for this command instead of parsing stdin
    #[arg(long)]
    pub print_args: bool,
    /// Repository root; defaults to the configured or current directory
    #[arg(long)]
    pub repo: Option<String>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum GitCommand {
    /// Parse `git diff` output for one file
    Diff {
        file: String,
        sha1: Option<String>,
        sha2: Option<String>,
        #[command(flatten)]
        common: Common,
    },
    /// Parse `git blame --porcelain` output
    Blame {
        file: String,
        #[arg(long)]
        sha: Option<String>,
        /// 1-based inclusive line range, e.g. `10,20`
        #[arg(long, value_parser = parse_range)]
        range: Option<LineRange>,
        #[command(flatten)]
        common: Common,
    },
    /// Parse `git log` output for the branch or one file
    Log {
        #[arg(long)]
        file: Option<String>,
        #[arg(long)]
        sha: Option<String>,
        #[arg(long)]
        max_count: Option<usize>,
        #[arg(long)]
        reverse: bool,
        /// 1-based inclusive line range (file history only)
        #[arg(long, value_parser = parse_range)]
        range: Option<LineRange>,
        #[command(flatten)]
        common: Common,
    },
    /// Parse `git status --porcelain` output
    Status {
        #[arg(long)]
        file: Option<String>,
        #[arg(long, value_enum, conflicts_with = "git_version")]
        porcelain: Option<Porcelain>,
        /// `git --version` output used to pick the porcelain format
        #[arg(long)]
        git_version: Option<String>,
        #[command(flatten)]
        common: Common,
    },
    /// Parse `git stash list` output
    Stash {
        #[command(flatten)]
        common: Common,
    },
    /// Parse `git branch` output
    Branches {
        #[arg(long)]
        all: bool,
        #[command(flatten)]
        common: Common,
    },
    /// Parse `git remote -v` output
    Remotes {
        #[command(flatten)]
        common: Common,
    },
}

/// Parse a 1-based `start,end` into a 0-based range.
pub fn parse_range(s: &str) -> Result<LineRange, String> {
    let (start, end) = s
        .split_once(',')
        .ok_or_else(|| format!("expected START,END, got `{s}`"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<usize>()
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| format!("invalid line number `{v}`"))
    };
    let (start, end) = (parse(start)?, parse(end)?);
    if end < start {
        return Err(format!("range end {end} is before start {start}"));
    }
    Ok(LineRange::new(start - 1, end - 1))
}

fn porcelain(explicit: Option<Porcelain>, git_version: Option<&str>) -> Result<PorcelainVersion> {
    match (explicit, git_version) {
        (Some(p), _) => Ok(p.into()),
        (None, Some(output)) => GitVersion::parse(output)
            .map(porcelain_version_for)
            .with_context(|| format!("unrecognized git version `{output}`")),
        (None, None) => Ok(PorcelainVersion::V2),
    }
}

impl GitCommand {
    fn common(&self) -> &Common {
        match self {
            Self::Diff { common, .. }
            | Self::Blame { common, .. }
            | Self::Log { common, .. }
            | Self::Status { common, .. }
            | Self::Stash { common }
            | Self::Branches { common, .. }
            | Self::Remotes { common } => common,
        }
    }

    #[must_use]
    pub fn prints_args(&self) -> bool {
        self.common().print_args
    }

    /// The git arguments whose output this command parses.
    pub fn git_args(&self) -> Result<Vec<String>> {
        Ok(match self {
            Self::Diff { file, sha1, sha2, .. } => {
                diff_args(file, sha1.as_deref(), sha2.as_deref())
            }
            Self::Blame {
                file, sha, range, ..
            } => blame_args(file, sha.as_deref(), *range),
            Self::Log {
                file,
                sha,
                max_count,
                reverse,
                range,
                ..
            } => match file {
                Some(file) => log_file_args(file, sha.as_deref(), *max_count, *reverse, *range),
                None if range.is_some() => bail!("--range needs --file"),
                None => log_args(sha.as_deref(), *max_count, *reverse),
            },
            Self::Status {
                file,
                porcelain: p,
                git_version,
                ..
            } => status_args(porcelain(*p, git_version.as_deref())?, file.as_deref()),
            Self::Stash { .. } => stash_list_args(),
            Self::Branches { all, .. } => branch_args(*all),
            Self::Remotes { .. } => remote_args(),
        })
    }

    /// Run against git output `input`. `default_repo` is used when
    /// `--repo` is not given.
    pub fn run(&self, input: &str, default_repo: &str) -> Result<Value> {
        let common = self.common();
        if common.print_args {
            return Ok(serde_json::to_value(self.git_args()?)?);
        }
        let repo = common.repo.as_deref().unwrap_or(default_repo);

        let value = match self {
            Self::Diff { .. } => serde_json::to_value(parse_diff(input))?,
            Self::Blame { file, range, .. } => {
                let blame = parse_blame(input, repo, file);
                match (blame, range) {
                    (Some(blame), Some(range)) => {
                        serde_json::to_value(blame.for_range(range.start, range.end))?
                    }
                    (blame, _) => serde_json::to_value(blame)?,
                }
            }
            Self::Log {
                file,
                sha,
                max_count,
                reverse,
                range,
                ..
            } => {
                let base = match file {
                    Some(file) => LogParams::file(repo, file),
                    None => LogParams::branch(repo),
                };
                let params = LogParams {
                    sha: sha.as_deref(),
                    max_count: *max_count,
                    reverse: *reverse,
                    range: *range,
                    ..base
                };
                serde_json::to_value(parse_log(input, params))?
            }
            Self::Status {
                porcelain: p,
                git_version,
                ..
            } => {
                let version = porcelain(*p, git_version.as_deref())?;
                serde_json::to_value(parse_status(input, repo, version))?
            }
            Self::Stash { .. } => serde_json::to_value(parse_stash(input, repo))?,
            Self::Branches { .. } => serde_json::to_value(parse_branches(input))?,
            Self::Remotes { .. } => serde_json::to_value(parse_remotes(input))?,
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn common() -> Common {
        Common {
            print_args: false,
            repo: None,
        }
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("10,20").unwrap(), LineRange::new(9, 19));
        assert_eq!(parse_range(" 3 , 3 ").unwrap(), LineRange::new(2, 2));
        assert!(parse_range("0,4").is_err());
        assert!(parse_range("5,4").is_err());
        assert!(parse_range("5").is_err());
    }

    #[test]
    fn test_print_args_for_blame_range() {
        let cmd = GitCommand::Blame {
            file: "src/lib.rs".to_string(),
            sha: None,
            range: Some(LineRange::new(0, 9)),
            common: Common {
                print_args: true,
                repo: None,
            },
        };
        let value = cmd.run("", "/repo").unwrap();
        assert_eq!(
            value,
            serde_json::json!(["blame", "--root", "--porcelain", "-L1,10", "--", "src/lib.rs"])
        );
    }

    #[test]
    fn test_status_porcelain_from_git_version() {
        assert_eq!(
            porcelain(None, Some("git version 2.9.5")).unwrap(),
            PorcelainVersion::V1
        );
        assert_eq!(
            porcelain(None, Some("git version 2.30.1")).unwrap(),
            PorcelainVersion::V2
        );
        assert_eq!(
            porcelain(Some(Porcelain::V1), None).unwrap(),
            PorcelainVersion::V1
        );
        assert!(porcelain(None, Some("hg 5")).is_err());
    }

    #[test]
    fn test_log_range_requires_file() {
        let cmd = GitCommand::Log {
            file: None,
            sha: None,
            max_count: None,
            reverse: false,
            range: Some(LineRange::new(0, 1)),
            common: common(),
        };
        assert!(cmd.git_args().is_err());
    }

    #[test]
    fn test_branches_and_remotes_to_json() {
        let branches = GitCommand::Branches {
            all: true,
            common: common(),
        }
        .run("* main\n  feature\n", "/repo")
        .unwrap();
        assert_eq!(branches.as_array().map(Vec::len), Some(2));
        assert_eq!(branches[0]["name"], "main");

        let remotes = GitCommand::Remotes { common: common() }
            .run(
                "origin\tgit@github.com:acme/widget.git (fetch)\n",
                "/repo",
            )
            .unwrap();
        assert_eq!(remotes[0]["name"], "origin");
    }

    #[test]
    fn test_unparseable_input_is_null() {
        let value = GitCommand::Diff {
            file: "a.rs".to_string(),
            sha1: None,
            sha2: None,
            common: common(),
        }
        .run("", "/repo")
        .unwrap();
        assert!(value.is_null());
    }
}
