//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::engine::ResolveOptions;
use crate::plugins::PluginOptions;
use crate::syntax::ParserOptions;

/// Errors raised while loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read config file '{path}': {source}")]
    Read {
        /// Config file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid configuration YAML
    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Application configuration
///
/// Every section is optional in the YAML file; missing fields take their
/// defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level used when no filter is set in the environment
    pub log_level: String,
    /// Pipe parser limits
    pub parser: ParserOptions,
    /// Resolution settings
    pub resolve: ResolveOptions,
    /// Plugin discovery settings
    pub plugins: PluginOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            parser: ParserOptions::default(),
            resolve: ResolveOptions::default(),
            plugins: PluginOptions::default(),
        }
    }
}

impl Config {
    /// Parses configuration YAML
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed YAML or invalid values
    /// (for example a zero limit).
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Loads configuration from a file
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }
}
