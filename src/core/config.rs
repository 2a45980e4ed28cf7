//! Configuration for the memory optimizer

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::areas::MemoryAreaSet;
use super::exclusions::ProcessExclusionList;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unable to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Main optimizer configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Areas reclaimed by `optimize`
    pub memory_areas: MemoryAreaSet,

    /// Processes whose working set is never emptied
    pub process_exclusion_list: Vec<String>,
}

impl OptimizerConfig {
    /// `<config dir>/memreclaim/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("memreclaim")
            .join("config.toml")
    }

    /// Load config from TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Like [`OptimizerConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to TOML file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        let io_err = |source: std::io::Error| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, content).map_err(io_err)
    }

    pub fn exclusions(&self) -> ProcessExclusionList {
        ProcessExclusionList::new(&self.process_exclusion_list)
    }
}
