//! `CMakeCache.txt` model.
//!
//! Entries are `KEY:TYPE=VALUE` lines. `//` lines directly above an entry
//! are its help string, `#` lines are comments, and a companion
//! `KEY-ADVANCED:INTERNAL=1` entry marks `KEY` as advanced.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::protocol::CacheContent;

const ADVANCED_SUFFIX: &str = "-ADVANCED";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheEntryType {
    Bool,
    String,
    Path,
    FilePath,
    Internal,
    Uninitialized,
    Static,
}

impl CacheEntryType {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BOOL" => Some(Self::Bool),
            "STRING" => Some(Self::String),
            "PATH" => Some(Self::Path),
            "FILEPATH" => Some(Self::FilePath),
            "INTERNAL" => Some(Self::Internal),
            "UNINITIALIZED" => Some(Self::Uninitialized),
            "STATIC" => Some(Self::Static),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "BOOL",
            Self::String => "STRING",
            Self::Path => "PATH",
            Self::FilePath => "FILEPATH",
            Self::Internal => "INTERNAL",
            Self::Uninitialized => "UNINITIALIZED",
            Self::Static => "STATIC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    #[serde(rename = "type")]
    pub entry_type: CacheEntryType,
    pub help_string: String,
    pub advanced: bool,
}

impl CacheEntry {
    /// Interpret the value the way CMake's `if()` treats constants.
    #[must_use]
    pub fn as_bool(&self) -> bool {
        is_truthy(&self.value)
    }
}

/// CMake boolean constant semantics.
#[must_use]
pub fn is_truthy(value: &str) -> bool {
    let upper = value.trim().to_ascii_uppercase();
    match upper.as_str() {
        "1" | "ON" | "YES" | "TRUE" | "Y" => true,
        "" | "0" | "OFF" | "NO" | "FALSE" | "N" | "IGNORE" | "NOTFOUND" => false,
        other if other.ends_with("-NOTFOUND") => false,
        other => other.parse::<f64>().is_ok_and(|n| n != 0.0),
    }
}

#[derive(Debug, Clone, Default)]
pub struct CmakeCache {
    path: Option<PathBuf>,
    entries: Vec<CacheEntry>,
    index: HashMap<String, usize>,
}

impl CmakeCache {
    /// Parse cache file contents. Unparseable lines are skipped.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut entries = Vec::new();
        let mut advanced = HashSet::new();
        let mut help = Vec::new();

        for line in text.lines() {
            let line = line.trim_end();
            if let Some(doc) = line.strip_prefix("//") {
                help.push(doc.to_string());
                continue;
            }
            if line.is_empty() || line.starts_with('#') {
                help.clear();
                continue;
            }
            let Some((key, entry_type, value)) = split_entry(line) else {
                tracing::trace!(line, "skipping unparseable cache line");
                help.clear();
                continue;
            };
            if let Some(owner) = key.strip_suffix(ADVANCED_SUFFIX) {
                if is_truthy(value) {
                    advanced.insert(owner.to_string());
                }
                help.clear();
                continue;
            }
            entries.push(CacheEntry {
                key: key.to_string(),
                value: value.to_string(),
                entry_type,
                help_string: help.join("\n"),
                advanced: false,
            });
            help.clear();
        }

        for entry in &mut entries {
            entry.advanced = advanced.contains(&entry.key);
        }
        Self::from_entries(entries)
    }

    /// Load a cache file. A missing file yields an empty cache.
    pub async fn from_path(path: &Path) -> io::Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => {
                let mut cache = Self::parse(&text);
                cache.path = Some(path.to_path_buf());
                Ok(cache)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Build from a server `cache` reply. Entries of unknown type are skipped.
    #[must_use]
    pub fn from_reply(content: CacheContent) -> Self {
        let entries = content
            .cache
            .into_iter()
            .filter_map(|entry| {
                let Some(entry_type) = CacheEntryType::parse(&entry.entry_type) else {
                    tracing::debug!(key = %entry.key, "unknown cache entry type {}", entry.entry_type);
                    return None;
                };
                Some(CacheEntry {
                    advanced: entry.properties.get("ADVANCED").is_some_and(|v| v == "1"),
                    help_string: entry.properties.get("HELPSTRING").cloned().unwrap_or_default(),
                    key: entry.key,
                    value: entry.value,
                    entry_type,
                })
            })
            .collect();
        Self::from_entries(entries)
    }

    fn from_entries(entries: Vec<CacheEntry>) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.key.clone(), i))
            .collect();
        Self {
            path: None,
            entries,
            index,
        }
    }

    /// Whether this cache was read from an existing file.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_some()
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    #[must_use]
    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Split `KEY:TYPE=VALUE`; the key may be double-quoted.
fn split_entry(line: &str) -> Option<(&str, CacheEntryType, &str)> {
    let (key, rest) = if let Some(quoted) = line.strip_prefix('"') {
        let end = quoted.find('"')?;
        (&quoted[..end], quoted[end + 1..].strip_prefix(':')?)
    } else {
        line.split_once(':')?
    };
    let (entry_type, value) = rest.split_once('=')?;
    Some((key, CacheEntryType::parse(entry_type)?, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const CACHE: &str = "\
# This is the CMakeCache file.

//Build type
//(Debug, Release)
CMAKE_BUILD_TYPE:STRING=Debug

//CXX compiler
CMAKE_CXX_COMPILER:FILEPATH=/usr/bin/c++

//Enable tests
BUILD_TESTING:BOOL=ON
\"KEY WITH SPACE\":STRING=a=b
CMAKE_HOME_DIRECTORY:INTERNAL=/home/me/project
CMAKE_CXX_COMPILER-ADVANCED:INTERNAL=1
garbage line
";

    #[test]
    fn test_parse_entries_and_help() {
        let cache = CmakeCache::parse(CACHE);
        assert_eq!(cache.entries().len(), 5);

        let build_type = cache.get("CMAKE_BUILD_TYPE").unwrap();
        assert_eq!(build_type.value, "Debug");
        assert_eq!(build_type.entry_type, CacheEntryType::String);
        assert_eq!(build_type.help_string, "Build type\n(Debug, Release)");
        assert!(!build_type.advanced);

        assert!(cache.get("CMAKE_CXX_COMPILER").unwrap().advanced);
        assert!(cache.get("BUILD_TESTING").unwrap().as_bool());
        assert_eq!(cache.get("KEY WITH SPACE").unwrap().value, "a=b");
        assert!(cache.get("CMAKE_HOME_DIRECTORY").unwrap().help_string.is_empty());
        assert!(cache.get("CMAKE_CXX_COMPILER-ADVANCED").is_none());
        assert!(!cache.exists());
    }

    #[test]
    fn test_truthiness() {
        for yes in ["ON", "on", "1", "TRUE", "yes", "Y", "2", "0.5"] {
            assert!(is_truthy(yes), "{yes}");
        }
        for no in ["OFF", "0", "", "FALSE", "no", "N", "IGNORE", "NOTFOUND", "FOO-NOTFOUND", "bar"] {
            assert!(!is_truthy(no), "{no}");
        }
    }

    #[test]
    fn test_from_reply() {
        let reply: CacheContent = serde_json::from_value(serde_json::json!({
            "cache": [
                {"key": "A", "type": "BOOL", "value": "OFF", "properties": {"HELPSTRING": "a flag", "ADVANCED": "1"}},
                {"key": "B", "type": "WEIRD", "value": "x", "properties": {}},
            ]
        }))
        .unwrap();
        let cache = CmakeCache::from_reply(reply);
        assert_eq!(cache.entries().len(), 1);
        let a = cache.get("A").unwrap();
        assert!(a.advanced);
        assert_eq!(a.help_string, "a flag");
        assert!(!a.as_bool());
    }

    #[tokio::test]
    async fn test_from_path_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CmakeCache::from_path(&dir.path().join("CMakeCache.txt"))
            .await
            .unwrap();
        assert!(cache.is_empty());
        assert!(!cache.exists());
    }

    #[tokio::test]
    async fn test_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CMakeCache.txt");
        fs::write(&path, CACHE).unwrap();

        let cache = CmakeCache::from_path(&path).await.unwrap();
        assert!(cache.exists());
        assert_eq!(cache.path(), Some(path.as_path()));
        assert_eq!(cache.get("CMAKE_BUILD_TYPE").unwrap().value, "Debug");
    }
}
