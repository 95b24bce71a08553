//! The server's `codemodel` reply and the queries built on it.

use std::collections::BTreeMap;
use std::fmt;
use std::mem;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::CmakeCache;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeModel {
    #[serde(default)]
    pub configurations: Vec<Configuration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub name: String,
    #[serde(default)]
    pub projects: Vec<Project>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub source_directory: String,
    #[serde(default)]
    pub build_directory: String,
    #[serde(default)]
    pub targets: Vec<Target>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub name: String,
    #[serde(rename = "type")]
    pub target_type: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub source_directory: String,
    #[serde(default)]
    pub build_directory: Option<String>,
    #[serde(default)]
    pub artifacts: Option<Vec<String>>,
    #[serde(default)]
    pub file_groups: Vec<FileGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileGroup {
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub compile_flags: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub include_path: Vec<IncludePath>,
    #[serde(default)]
    pub defines: Vec<String>,
    #[serde(default)]
    pub is_generated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncludePath {
    pub path: String,
    #[serde(default)]
    pub is_system: bool,
}

/// A target that can be passed to `cmake --build --target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTarget {
    pub name: String,
    /// `EXECUTABLE`, `STATIC_LIBRARY`, ...; unknown for legacy targets.
    pub target_type: Option<String>,
    pub artifact: Option<String>,
}

impl BuildTarget {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_type: None,
            artifact: None,
        }
    }

    #[must_use]
    pub fn is_executable(&self) -> bool {
        self.target_type.as_deref() == Some("EXECUTABLE")
    }
}

/// How one source file is compiled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilationInfo {
    pub file: String,
    pub compile_definitions: BTreeMap<String, Option<String>>,
    pub compile_flags: Vec<String>,
    pub include_directories: Vec<IncludePath>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompilerId {
    #[serde(rename = "MSVC")]
    Msvc,
    #[serde(rename = "GNU")]
    Gnu,
    Clang,
}

impl fmt::Display for CompilerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Msvc => "MSVC",
            Self::Gnu => "GNU",
            Self::Clang => "Clang",
        })
    }
}

impl CodeModel {
    /// The configuration for `build_type`. A single-configuration model is
    /// used whatever its name.
    #[must_use]
    pub fn configuration(&self, build_type: &str) -> Option<&Configuration> {
        match self.configurations.as_slice() {
            [only] => Some(only),
            all => all.iter().find(|c| c.name == build_type),
        }
    }

    fn all_targets<'a>(&'a self, build_type: &str) -> impl Iterator<Item = &'a Target> + 'a {
        self.configuration(build_type)
            .into_iter()
            .flat_map(|c| &c.projects)
            .flat_map(|p| &p.targets)
    }

    /// Buildable targets: those with a build directory and at least one artifact.
    #[must_use]
    pub fn targets(&self, build_type: &str) -> Vec<BuildTarget> {
        if self.configuration(build_type).is_none() {
            tracing::warn!("code model has no configuration named `{build_type}`");
        }
        self.all_targets(build_type)
            .filter(|t| t.build_directory.is_some())
            .filter_map(|t| {
                let artifact = t.artifacts.as_ref()?.first()?;
                Some(BuildTarget {
                    name: t.name.clone(),
                    target_type: Some(t.target_type.clone()),
                    artifact: Some(artifact.clone()),
                })
            })
            .collect()
    }

    /// Compile settings of the file group that lists `file`.
    ///
    /// Relative sources resolve against their target's source directory and a
    /// relative `file` against `source_dir`.
    #[must_use]
    pub fn compilation_info(
        &self,
        file: &Path,
        source_dir: &Path,
        build_type: &str,
    ) -> Option<CompilationInfo> {
        let wanted = normalize_path(&source_dir.join(file));
        for target in self.all_targets(build_type) {
            let target_dir = Path::new(&target.source_directory);
            for group in &target.file_groups {
                let found = group
                    .sources
                    .iter()
                    .any(|src| normalize_path(&target_dir.join(src)) == wanted);
                if found {
                    return Some(CompilationInfo {
                        file: wanted.display().to_string(),
                        compile_definitions: group
                            .defines
                            .iter()
                            .map(|d| parse_compile_definition(d))
                            .collect(),
                        compile_flags: split_command_line(&group.compile_flags),
                        include_directories: group.include_path.clone(),
                    });
                }
            }
        }
        tracing::trace!(file = %wanted.display(), "no file group lists file");
        None
    }
}

/// Identify the compiler family from `CMAKE_CXX_COMPILER`, then `CMAKE_C_COMPILER`.
#[must_use]
pub fn compiler_id(cache: &CmakeCache) -> Option<CompilerId> {
    ["CXX", "C"].iter().find_map(|lang| {
        let entry = cache.get(&format!("CMAKE_{lang}_COMPILER"))?;
        compiler_id_for_path(&entry.value)
    })
}

fn compiler_id_for_path(path: &str) -> Option<CompilerId> {
    let name = path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
        .to_ascii_lowercase();
    if name.ends_with("cl.exe") && !name.contains("clang") {
        Some(CompilerId::Msvc)
    } else if name.contains("clang") {
        Some(CompilerId::Clang)
    } else if name.contains("gcc") || name.contains("g++") {
        Some(CompilerId::Gnu)
    } else {
        None
    }
}

/// `NAME=value` or bare `NAME`.
#[must_use]
pub fn parse_compile_definition(define: &str) -> (String, Option<String>) {
    match define.split_once('=') {
        Some((name, value)) => (name.to_string(), Some(value.to_string())),
        None => (define.to_string(), None),
    }
}

/// Split a compiler command line into arguments, honouring quotes and
/// backslash escapes.
#[must_use]
pub fn split_command_line(cmd: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut quote: Option<char> = None;
    let mut chars = cmd.chars();

    while let Some(c) = chars.next() {
        match (c, quote) {
            ('\\', q) if q != Some('\'') => {
                in_arg = true;
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            (c, Some(q)) if c == q => quote = None,
            (c, Some(_)) => current.push(c),
            ('"' | '\'', None) => {
                in_arg = true;
                quote = Some(c);
            }
            (c, None) if c.is_whitespace() => {
                if in_arg {
                    args.push(mem::take(&mut current));
                    in_arg = false;
                }
            }
            (c, None) => {
                in_arg = true;
                current.push(c);
            }
        }
    }
    if in_arg {
        args.push(current);
    }
    args
}

/// Lexically resolve `.` and `..` components.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut out = Vec::new();
    for c in path.components() {
        match c {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> CodeModel {
        serde_json::from_value(serde_json::json!({
            "configurations": [
                {
                    "name": "Debug",
                    "projects": [{
                        "name": "demo",
                        "sourceDirectory": "/src",
                        "buildDirectory": "/src/build",
                        "targets": [
                            {
                                "name": "app",
                                "type": "EXECUTABLE",
                                "sourceDirectory": "/src/app",
                                "buildDirectory": "/src/build/app",
                                "artifacts": ["/src/build/app/app"],
                                "fileGroups": [{
                                    "sources": ["main.cpp", "../common/util.cpp"],
                                    "compileFlags": "-g -Wall \"-DMSG=hello world\"",
                                    "language": "CXX",
                                    "includePath": [
                                        {"path": "/src/include"},
                                        {"path": "/usr/include/boost", "isSystem": true}
                                    ],
                                    "defines": ["DEBUG", "LEVEL=2"]
                                }]
                            },
                            {
                                "name": "check",
                                "type": "UTILITY",
                                "sourceDirectory": "/src"
                            }
                        ]
                    }]
                },
                {"name": "Release", "projects": []}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_targets_require_build_dir_and_artifact() {
        let targets = model().targets("Debug");
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].name, "app");
        assert!(targets[0].is_executable());
        assert_eq!(targets[0].artifact.as_deref(), Some("/src/build/app/app"));
        assert!(model().targets("Release").is_empty());
        assert!(model().targets("MinSizeRel").is_empty());
    }

    #[test]
    fn test_single_configuration_matches_any_build_type() {
        let mut single = model();
        single.configurations.truncate(1);
        assert_eq!(single.targets("Release").len(), 1);
    }

    #[test]
    fn test_compilation_info_resolves_relative_paths() {
        let info = model()
            .compilation_info(Path::new("common/util.cpp"), Path::new("/src"), "Debug")
            .unwrap();
        assert_eq!(info.file, "/src/common/util.cpp");
        assert_eq!(info.compile_flags, vec!["-g", "-Wall", "-DMSG=hello world"]);
        assert_eq!(info.compile_definitions.get("DEBUG"), Some(&None));
        assert_eq!(info.compile_definitions.get("LEVEL"), Some(&Some("2".to_string())));
        assert!(info.include_directories[1].is_system);

        let absolute = model().compilation_info(Path::new("/src/app/main.cpp"), Path::new("/elsewhere"), "Debug");
        assert!(absolute.is_some());
        assert!(model()
            .compilation_info(Path::new("missing.cpp"), Path::new("/src"), "Debug")
            .is_none());
    }

    #[test]
    fn test_compiler_id() {
        let cache = CmakeCache::parse("CMAKE_CXX_COMPILER:FILEPATH=/usr/bin/clang++\n");
        assert_eq!(compiler_id(&cache), Some(CompilerId::Clang));

        let cache = CmakeCache::parse(
            "CMAKE_CXX_COMPILER:FILEPATH=/opt/weird/cxx\nCMAKE_C_COMPILER:FILEPATH=/usr/bin/gcc-12\n",
        );
        assert_eq!(compiler_id(&cache), Some(CompilerId::Gnu));

        let cache = CmakeCache::parse("CMAKE_CXX_COMPILER:FILEPATH=C:/VS/bin/cl.exe\n");
        assert_eq!(compiler_id(&cache), Some(CompilerId::Msvc));
        assert_eq!(CompilerId::Msvc.to_string(), "MSVC");

        assert_eq!(compiler_id(&CmakeCache::default()), None);
    }

    #[test]
    fn test_split_command_line() {
        assert_eq!(
            split_command_line(r#"  -I/a\ b 'single quoted' -D"X=1"  "" "#),
            vec!["-I/a b", "single quoted", "-DX=1", ""]
        );
        assert!(split_command_line("   ").is_empty());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/src/app/../common/./util.cpp")),
            PathBuf::from("/src/common/util.cpp")
        );
    }
}
