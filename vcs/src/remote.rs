//! `git remote -v` parser.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static REMOTE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\S+)\s+(\S+)\s+\((fetch|push)\)$").expect("valid remote line regex")
});

// Captures the host and the repository path for the url forms git accepts.
static PROVIDER_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?:git|https?|ssh|git\+ssh)://(?:[^@/]+@)?([^/:]+)(?::\d+)?/|(?:[^@/]+@)?([^/:]+):)(.+?)(?:\.git)?/?$",
    )
    .expect("valid remote url regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteKind {
    Fetch,
    Push,
}

/// Hosting domain and repository path, e.g. `github.com` and `owner/repo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteProvider {
    pub domain: String,
    pub path: String,
}

impl RemoteProvider {
    #[must_use]
    pub fn from_url(url: &str) -> Option<Self> {
        let caps = PROVIDER_URL.captures(url)?;
        let domain = caps.get(1).or_else(|| caps.get(2))?.as_str();
        let path = caps.get(3)?.as_str();
        Some(Self {
            domain: domain.to_string(),
            path: path.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Remote {
    pub name: String,
    pub url: String,
    pub kind: RemoteKind,
    pub provider: Option<RemoteProvider>,
}

#[must_use]
pub fn parse_remotes(data: &str) -> Vec<Remote> {
    data.lines()
        .filter_map(|line| {
            let caps = REMOTE_LINE.captures(line.trim())?;
            let url = caps.get(2)?.as_str();
            let kind = match caps.get(3)?.as_str() {
                "push" => RemoteKind::Push,
                _ => RemoteKind::Fetch,
            };
            Some(Remote {
                name: caps.get(1)?.as_str().to_string(),
                url: url.to_string(),
                kind,
                provider: RemoteProvider::from_url(url),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fetch_and_push() {
        let data = "\
origin\tgit@github.com:owner/repo.git (fetch)
origin\tgit@github.com:owner/repo.git (push)
upstream\thttps://gitlab.com/group/sub/project (fetch)
";
        let remotes = parse_remotes(data);
        assert_eq!(remotes.len(), 3);
        assert_eq!(remotes[0].name, "origin");
        assert_eq!(remotes[0].kind, RemoteKind::Fetch);
        assert_eq!(remotes[1].kind, RemoteKind::Push);

        let provider = remotes[0].provider.as_ref().unwrap();
        assert_eq!(provider.domain, "github.com");
        assert_eq!(provider.path, "owner/repo");

        let provider = remotes[2].provider.as_ref().unwrap();
        assert_eq!(provider.domain, "gitlab.com");
        assert_eq!(provider.path, "group/sub/project");
    }

    #[test]
    fn provider_url_forms() {
        let cases = [
            ("https://github.com/owner/repo.git", "github.com", "owner/repo"),
            ("https://user@bitbucket.org/owner/repo", "bitbucket.org", "owner/repo"),
            ("ssh://git@example.com:2222/owner/repo.git", "example.com", "owner/repo"),
            ("git://example.org/owner/repo", "example.org", "owner/repo"),
            ("example.org:owner/repo.git", "example.org", "owner/repo"),
        ];
        for (url, domain, path) in cases {
            let provider = RemoteProvider::from_url(url).unwrap();
            assert_eq!(provider.domain, domain, "{url}");
            assert_eq!(provider.path, path, "{url}");
        }
    }

    #[test]
    fn local_paths_have_no_provider() {
        assert!(RemoteProvider::from_url("/srv/git/repo.git").is_none());
        let remotes = parse_remotes("local\t/srv/git/repo.git (fetch)\n");
        assert_eq!(remotes.len(), 1);
        assert!(remotes[0].provider.is_none());
    }

    #[test]
    fn garbage_lines_are_skipped() {
        assert!(parse_remotes("fatal: not a git repository\n").is_empty());
    }
}
