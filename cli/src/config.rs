//! `codelens.toml` loading.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use codelens_cmake::CmakeConfig;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "codelens.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Repository root used to resolve paths in parsed output.
    pub repo_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Project root; defaults to the current directory.
    pub workspace_root: Option<PathBuf>,
    pub git: GitConfig,
    pub cmake: CmakeConfig,
}

impl AppConfig {
    /// Load from `path`, or `./codelens.toml` when no path is given.
    /// A missing default file yields the defaults; a missing explicit file
    /// is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if !explicit && e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("no {} found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                tracing::warn!("Failed to read config at {}: {source}", path.display());
                return Err(ConfigError::Read { path, source });
            }
        };

        toml::from_str(&content).map_err(|source| {
            tracing::warn!("Failed to parse config at {}: {source}", path.display());
            ConfigError::Parse { path, source }
        })
    }

    pub fn workspace_root(&self) -> io::Result<PathBuf> {
        match &self.workspace_root {
            Some(root) => Ok(root.clone()),
            None => env::current_dir(),
        }
    }
}
