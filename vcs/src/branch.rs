//! `git branch [-a]` parser.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub name: String,
    pub current: bool,
    pub remote: bool,
    /// Target of a symbolic ref such as `origin/HEAD -> origin/main`.
    pub tip: Option<String>,
    pub detached: bool,
}

impl Branch {
    /// Remote name for a remote-tracking branch, e.g. `origin` for `origin/main`.
    #[must_use]
    pub fn remote_name(&self) -> Option<&str> {
        if !self.remote {
            return None;
        }
        self.name.split_once('/').map(|(remote, _)| remote)
    }
}

#[must_use]
pub fn parse_branches(data: &str) -> Vec<Branch> {
    data.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<Branch> {
    if line.trim().is_empty() {
        return None;
    }
    let (current, rest) = match line.strip_prefix("* ") {
        Some(rest) => (true, rest),
        None => (false, line.trim_start_matches(['+', ' '])),
    };
    let rest = rest.trim();

    if rest.starts_with('(') && rest.ends_with(')') {
        // "(HEAD detached at 1a2b3c4)" or "(no branch, rebasing main)"
        return Some(Branch {
            name: rest.trim_matches(['(', ')']).to_string(),
            current,
            remote: false,
            tip: None,
            detached: true,
        });
    }

    let (name, tip) = match rest.split_once(" -> ") {
        Some((name, tip)) => (name, Some(tip.to_string())),
        None => (rest, None),
    };
    let (remote, name) = match name.strip_prefix("remotes/") {
        Some(name) => (true, name),
        None => (false, name),
    };

    Some(Branch {
        name: name.to_string(),
        current,
        remote,
        tip,
        detached: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_local_and_remote_branches() {
        let data = "\
  feature/parser
* main
  remotes/origin/HEAD -> origin/main
  remotes/origin/main
";
        let branches = parse_branches(data);
        assert_eq!(branches.len(), 4);

        assert_eq!(branches[0].name, "feature/parser");
        assert!(!branches[0].current);
        assert!(branches[0].remote_name().is_none());

        assert!(branches[1].current);
        assert_eq!(branches[1].name, "main");

        assert!(branches[2].remote);
        assert_eq!(branches[2].name, "origin/HEAD");
        assert_eq!(branches[2].tip.as_deref(), Some("origin/main"));

        assert_eq!(branches[3].remote_name(), Some("origin"));
        assert!(branches[3].tip.is_none());
    }

    #[test]
    fn detached_head() {
        let branches = parse_branches("* (HEAD detached at 1a2b3c4)\n  main\n");
        assert!(branches[0].current);
        assert!(branches[0].detached);
        assert_eq!(branches[0].name, "HEAD detached at 1a2b3c4");
        assert!(!branches[1].detached);
    }

    #[test]
    fn worktree_marker_is_stripped() {
        let branches = parse_branches("+ other-worktree\n");
        assert_eq!(branches[0].name, "other-worktree");
        assert!(!branches[0].current);
    }
}
