//! Project settings and the resolved context the drivers run with.
//!
//! [`CmakeConfig`] is the deserialized `[cmake]` section. Each key may be
//! overridden per platform in `[cmake.linux]`, `[cmake.osx]` or
//! `[cmake.windows]`. [`CmakeContext`] is the result of applying defaults,
//! the platform override and variable substitution.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::thread;

use serde::Deserialize;

use crate::types::ServerParams;

const DEFAULT_BUILD_TYPE: &str = "Debug";

const DEFAULT_PREFERRED_GENERATORS: &[&str] = &["Ninja", "Unix Makefiles"];

/// A `-D` value from `configure_settings`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<String>),
}

impl SettingValue {
    /// The `-DKEY[:TYPE]=VALUE` argument for this value.
    #[must_use]
    pub fn cache_argument(&self, key: &str) -> String {
        match self {
            Self::Bool(b) => format!("-D{key}:BOOL={}", if *b { "TRUE" } else { "FALSE" }),
            Self::Integer(n) => format!("-D{key}={n}"),
            Self::Float(n) => format!("-D{key}={n}"),
            Self::String(s) => format!("-D{key}:STRING={s}"),
            Self::List(items) => format!("-D{key}:STRING={}", items.join(";")),
        }
    }
}

/// One layer of settings. Unset keys fall through to the next layer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CmakeSettings {
    pub cmake_path: Option<PathBuf>,
    pub build_directory: Option<String>,
    pub source_directory: Option<String>,
    pub build_type: Option<String>,
    pub generator: Option<String>,
    pub preferred_generators: Option<Vec<String>>,
    pub toolset: Option<String>,
    pub platform: Option<String>,
    pub configure_args: Option<Vec<String>>,
    pub configure_settings: Option<BTreeMap<String, SettingValue>>,
    pub build_args: Option<Vec<String>>,
    pub build_tool_args: Option<Vec<String>>,
    pub parallel_jobs: Option<usize>,
    pub environment: Option<HashMap<String, String>>,
    pub configure_environment: Option<HashMap<String, String>>,
    pub build_environment: Option<HashMap<String, String>>,
    pub use_cmake_server: Option<bool>,
}

macro_rules! overlay {
    ($base:expr, $over:expr, $($field:ident),+ $(,)?) => {
        CmakeSettings {
            $($field: $over.$field.clone().or_else(|| $base.$field.clone()),)+
        }
    };
}

impl CmakeSettings {
    /// `self` with every key set in `over` replaced.
    #[must_use]
    pub fn overlaid(&self, over: &Self) -> Self {
        overlay!(
            self,
            over,
            cmake_path,
            build_directory,
            source_directory,
            build_type,
            generator,
            preferred_generators,
            toolset,
            platform,
            configure_args,
            configure_settings,
            build_args,
            build_tool_args,
            parallel_jobs,
            environment,
            configure_environment,
            build_environment,
            use_cmake_server,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    Osx,
    Windows,
}

impl Platform {
    #[must_use]
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::Osx
        } else {
            Self::Linux
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CmakeConfig {
    #[serde(flatten)]
    pub base: CmakeSettings,
    pub linux: Option<CmakeSettings>,
    pub osx: Option<CmakeSettings>,
    pub windows: Option<CmakeSettings>,
}

impl CmakeConfig {
    /// Base settings with the override for `platform` applied.
    #[must_use]
    pub fn for_platform(&self, platform: Platform) -> CmakeSettings {
        let over = match platform {
            Platform::Linux => self.linux.as_ref(),
            Platform::Osx => self.osx.as_ref(),
            Platform::Windows => self.windows.as_ref(),
        };
        match over {
            Some(over) => self.base.overlaid(over),
            None => self.base.clone(),
        }
    }
}

/// Replace `${buildType}`, `${workspaceRoot}` and `${workspaceRootFolderName}`.
/// Unknown variables are left as written.
#[must_use]
pub fn substitute(value: &str, workspace_root: &Path, build_type: &str) -> String {
    let folder_name = workspace_root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            rest = &rest[start..];
            break;
        };
        match &after[..end] {
            "buildType" => out.push_str(build_type),
            "workspaceRoot" => out.push_str(&workspace_root.display().to_string()),
            "workspaceRootFolderName" => out.push_str(&folder_name),
            _ => out.push_str(&rest[start..start + 3 + end]),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

fn default_parallel_jobs() -> usize {
    thread::available_parallelism().map_or(1, usize::from) + 2
}

fn merged_env(
    base: &HashMap<String, String>,
    over: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut env = base.clone();
    env.extend(over.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}

/// Fully resolved settings for one project.
#[derive(Debug, Clone, PartialEq)]
pub struct CmakeContext {
    pub workspace_root: PathBuf,
    pub cmake_path: PathBuf,
    pub source_dir: PathBuf,
    pub build_dir: PathBuf,
    pub build_type: String,
    pub generator: Option<String>,
    pub preferred_generators: Vec<String>,
    pub toolset: Option<String>,
    pub platform: Option<String>,
    pub configure_args: Vec<String>,
    pub configure_settings: BTreeMap<String, SettingValue>,
    pub build_args: Vec<String>,
    pub build_tool_args: Vec<String>,
    pub parallel_jobs: usize,
    pub environment: HashMap<String, String>,
    pub configure_environment: HashMap<String, String>,
    pub build_environment: HashMap<String, String>,
    pub use_cmake_server: bool,
}

impl CmakeContext {
    /// Resolve `config` for the current platform against `workspace_root`.
    #[must_use]
    pub fn new(workspace_root: &Path, config: &CmakeConfig) -> Self {
        Self::from_settings(workspace_root, config.for_platform(Platform::current()))
    }

    #[must_use]
    pub fn from_settings(workspace_root: &Path, settings: CmakeSettings) -> Self {
        let build_type = settings
            .build_type
            .unwrap_or_else(|| DEFAULT_BUILD_TYPE.to_string());
        let dir = |value: Option<String>, default: &str| {
            let raw = value.unwrap_or_else(|| default.to_string());
            let path = PathBuf::from(substitute(&raw, workspace_root, &build_type));
            if path.is_absolute() {
                path
            } else {
                workspace_root.join(path)
            }
        };

        Self {
            workspace_root: workspace_root.to_path_buf(),
            cmake_path: settings.cmake_path.unwrap_or_else(|| PathBuf::from("cmake")),
            source_dir: dir(settings.source_directory, "${workspaceRoot}"),
            build_dir: dir(settings.build_directory, "${workspaceRoot}/build"),
            generator: settings.generator,
            preferred_generators: settings.preferred_generators.unwrap_or_else(|| {
                DEFAULT_PREFERRED_GENERATORS
                    .iter()
                    .map(ToString::to_string)
                    .collect()
            }),
            toolset: settings.toolset,
            platform: settings.platform,
            configure_args: settings.configure_args.unwrap_or_default(),
            configure_settings: settings.configure_settings.unwrap_or_default(),
            build_args: settings.build_args.unwrap_or_default(),
            build_tool_args: settings.build_tool_args.unwrap_or_default(),
            parallel_jobs: settings
                .parallel_jobs
                .filter(|&n| n > 0)
                .unwrap_or_else(default_parallel_jobs),
            environment: settings.environment.unwrap_or_default(),
            configure_environment: settings.configure_environment.unwrap_or_default(),
            build_environment: settings.build_environment.unwrap_or_default(),
            use_cmake_server: settings.use_cmake_server.unwrap_or(false),
            build_type,
        }
    }

    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        self.build_dir.join("CMakeCache.txt")
    }

    /// `-D` arguments for every configure: build type, settings, then the
    /// user's raw configure arguments.
    #[must_use]
    pub fn cache_arguments(&self) -> Vec<String> {
        let mut args = vec![format!("-DCMAKE_BUILD_TYPE:STRING={}", self.build_type)];
        args.extend(
            self.configure_settings
                .iter()
                .map(|(key, value)| value.cache_argument(key)),
        );
        args.extend(self.configure_args.iter().cloned());
        args
    }

    #[must_use]
    pub fn configure_env(&self) -> HashMap<String, String> {
        merged_env(&self.environment, &self.configure_environment)
    }

    #[must_use]
    pub fn build_env(&self) -> HashMap<String, String> {
        merged_env(&self.environment, &self.build_environment)
    }

    /// Parameters for starting a cmake server on this project.
    #[must_use]
    pub fn server_params(&self) -> ServerParams {
        ServerParams {
            cmake_path: self.cmake_path.clone(),
            source_dir: self.source_dir.clone(),
            build_dir: self.build_dir.clone(),
            generator: self.generator.clone(),
            preferred_generators: self.preferred_generators.clone(),
            toolset: self.toolset.clone(),
            platform: self.platform.clone(),
            environment: self.configure_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(json: serde_json::Value) -> CmakeConfig {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_substitute_variables() {
        let root = Path::new("/home/me/widget");
        assert_eq!(
            substitute("${workspaceRoot}/build/${buildType}", root, "Release"),
            "/home/me/widget/build/Release"
        );
        assert_eq!(substitute("out-${workspaceRootFolderName}", root, "Debug"), "out-widget");
        assert_eq!(substitute("${HOME}/x", root, "Debug"), "${HOME}/x");
        assert_eq!(substitute("a${unterminated", root, "Debug"), "a${unterminated");
    }

    #[test]
    fn test_defaults() {
        let ctx = CmakeContext::from_settings(Path::new("/p"), CmakeSettings::default());
        assert_eq!(ctx.cmake_path, PathBuf::from("cmake"));
        assert_eq!(ctx.source_dir, PathBuf::from("/p"));
        assert_eq!(ctx.build_dir, PathBuf::from("/p/build"));
        assert_eq!(ctx.build_type, "Debug");
        assert_eq!(ctx.preferred_generators, vec!["Ninja", "Unix Makefiles"]);
        assert!(ctx.parallel_jobs >= 3);
        assert!(!ctx.use_cmake_server);
        assert_eq!(ctx.cache_path(), PathBuf::from("/p/build/CMakeCache.txt"));
    }

    #[test]
    fn test_relative_build_directory_and_build_type() {
        let settings = CmakeSettings {
            build_directory: Some("out/${buildType}".to_string()),
            build_type: Some("Release".to_string()),
            ..CmakeSettings::default()
        };
        let ctx = CmakeContext::from_settings(Path::new("/p"), settings);
        assert_eq!(ctx.build_dir, PathBuf::from("/p/out/Release"));
    }

    #[test]
    fn test_platform_override() {
        let cfg = config(serde_json::json!({
            "generator": "Ninja",
            "build_directory": "base",
            "windows": {"generator": "NMake Makefiles"},
            "osx": {"build_directory": "mac"}
        }));
        let windows = cfg.for_platform(Platform::Windows);
        assert_eq!(windows.generator.as_deref(), Some("NMake Makefiles"));
        assert_eq!(windows.build_directory.as_deref(), Some("base"));

        let osx = cfg.for_platform(Platform::Osx);
        assert_eq!(osx.generator.as_deref(), Some("Ninja"));
        assert_eq!(osx.build_directory.as_deref(), Some("mac"));

        assert_eq!(cfg.for_platform(Platform::Linux), cfg.base);
    }

    #[test]
    fn test_cache_arguments() {
        let cfg = config(serde_json::json!({
            "configure_settings": {
                "BUILD_TESTING": true,
                "JOBS": 4,
                "NAME": "demo",
                "LANGS": ["C", "CXX"]
            },
            "configure_args": ["-Wdev"]
        }));
        let ctx = CmakeContext::from_settings(Path::new("/p"), cfg.base);
        assert_eq!(
            ctx.cache_arguments(),
            vec![
                "-DCMAKE_BUILD_TYPE:STRING=Debug",
                "-DBUILD_TESTING:BOOL=TRUE",
                "-DJOBS=4",
                "-DLANGS:STRING=C;CXX",
                "-DNAME:STRING=demo",
                "-Wdev",
            ]
        );
    }

    #[test]
    fn test_environments_layer_over_base() {
        let cfg = config(serde_json::json!({
            "environment": {"A": "1", "B": "1"},
            "configure_environment": {"B": "2"},
            "build_environment": {"C": "3"}
        }));
        let ctx = CmakeContext::from_settings(Path::new("/p"), cfg.base);
        let configure = ctx.configure_env();
        assert_eq!(configure.get("B").map(String::as_str), Some("2"));
        assert!(!configure.contains_key("C"));
        let build = ctx.build_env();
        assert_eq!(build.get("B").map(String::as_str), Some("1"));
        assert_eq!(build.get("C").map(String::as_str), Some("3"));
        assert_eq!(ctx.server_params().environment, configure);
    }
}
