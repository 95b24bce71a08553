//! Record splitter for the keyed `--format` used by log and stash listing.
//!
//! ```text
//! <sha> -
//! author <name>
//! author-date <%ai>
//! parents <sha> <sha>
//! reflog-selector <%gd>
//! summary <subject>
//! <body...>
//! filename ?
//!
//! M	path
//! R100	old	new
//! ```

use std::sync::LazyLock;

use regex::Regex;

use crate::commit::is_full_sha;

static STATUS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([ACDMRTUXB])\d*\t([^\t]+)(?:\t(.+))?$").expect("valid name-status regex")
});

/// One `name-status` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawStatus {
    pub code: char,
    pub file_name: String,
    pub original_file_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RawEntry {
    pub sha: String,
    pub author: Option<String>,
    pub date: Option<String>,
    pub parents: Vec<String>,
    pub reflog_selector: Option<String>,
    pub message: String,
    pub statuses: Vec<RawStatus>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Summary,
    Files,
}

/// Split keyed log output into records, in output order.
pub(crate) fn parse_entries(data: &str) -> Vec<RawEntry> {
    let mut entries = Vec::new();
    let mut current: Option<RawEntry> = None;
    let mut section = Section::Header;

    for line in data.lines() {
        if let Some(sha) = line.strip_suffix(" -")
            && is_full_sha(sha)
        {
            entries.extend(current.take());
            current = Some(RawEntry {
                sha: sha.to_string(),
                ..RawEntry::default()
            });
            section = Section::Header;
            continue;
        }

        let Some(entry) = current.as_mut() else {
            continue;
        };

        match section {
            Section::Summary => {
                if line.starts_with("filename ") {
                    section = Section::Files;
                } else {
                    entry.message.push('\n');
                    entry.message.push_str(line);
                }
            }
            Section::Files => {
                if let Some(status) = parse_status_line(line) {
                    entry.statuses.push(status);
                }
            }
            Section::Header => {
                let (key, rest) = line.split_once(' ').unwrap_or((line, ""));
                match key {
                    "author" => entry.author = Some(rest.to_string()),
                    "author-date" => entry.date = Some(rest.to_string()),
                    "parents" => {
                        entry.parents = rest.split_whitespace().map(str::to_string).collect();
                    }
                    "reflog-selector" => entry.reflog_selector = Some(rest.to_string()),
                    "summary" => {
                        entry.message = rest.to_string();
                        section = Section::Summary;
                    }
                    "filename" => section = Section::Files,
                    _ => {}
                }
            }
        }
    }
    entries.extend(current);

    for entry in &mut entries {
        entry.message = entry.message.trim_end().to_string();
    }
    entries
}

fn parse_status_line(line: &str) -> Option<RawStatus> {
    let caps = STATUS_LINE.captures(line)?;
    let code = caps.get(1)?.as_str().chars().next()?;
    let first = caps.get(2)?.as_str().to_string();
    Some(match caps.get(3) {
        Some(second) => RawStatus {
            code,
            file_name: second.as_str().to_string(),
            original_file_name: Some(first),
        },
        None => RawStatus {
            code,
            file_name: first,
            original_file_name: None,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_records_and_reads_bodies() {
        let data = "\
aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa -
author Alice
author-date 2017-03-01 12:00:00 +0100
parents bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb
summary Subject line

Body paragraph.
filename ?

M\tsrc/lib.rs
R087\tsrc/old.rs\tsrc/new.rs

bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb -
author Bob
author-date 2017-02-01 12:00:00 +0100
parents
summary Root
filename ?

A\tsrc/lib.rs
";
        let entries = parse_entries(data);
        assert_eq!(entries.len(), 2);

        let first = &entries[0];
        assert_eq!(first.author.as_deref(), Some("Alice"));
        assert_eq!(first.message, "Subject line\n\nBody paragraph.");
        assert_eq!(first.parents.len(), 1);
        assert_eq!(first.statuses.len(), 2);
        assert_eq!(first.statuses[1].code, 'R');
        assert_eq!(first.statuses[1].file_name, "src/new.rs");
        assert_eq!(first.statuses[1].original_file_name.as_deref(), Some("src/old.rs"));

        let second = &entries[1];
        assert!(second.parents.is_empty());
        assert_eq!(second.message, "Root");
    }

    #[test]
    fn patch_text_between_records_is_skipped() {
        let data = "\
aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa -
author Alice
summary Change
filename ?

diff --git a/f b/f
@@ -1 +1 @@
-old
+new
";
        let entries = parse_entries(data);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].statuses.is_empty());
    }

    #[test]
    fn text_before_first_record_is_ignored() {
        assert!(parse_entries("warning: something\n").is_empty());
    }
}
