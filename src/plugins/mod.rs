//! Validator and transformer plugins
//!
//! Plugins are compiled Rust types behind the [`Validator`] and
//! [`Transformer`] traits. A [`PluginRegistry`] owns them; it is filled
//! explicitly (built-ins, caller types) and by directory discovery through a
//! [`PluginLoader`].

pub mod builtin;
mod discovery;
mod registry;
mod traits;

pub use discovery::{CatalogLoader, LoadedPlugin, PluginFactory, PluginLoader, PluginManifest};
pub use registry::{DiscoveryReport, PluginListing, PluginRegistry};
pub use traits::{Params, PluginKind, PluginMetadata, Transformer, Validator, VariableContext};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Where and how plugins are discovered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginOptions {
    /// Directories scanned for validator manifests
    pub validator_dirs: Vec<PathBuf>,
    /// Directories scanned for transformer manifests
    pub transformer_dirs: Vec<PathBuf>,
    /// File name pattern for validators
    pub validator_pattern: String,
    /// File name pattern for transformers
    pub transformer_pattern: String,
    /// Limit for one whole discovery pass, in milliseconds
    pub discovery_timeout_ms: u64,
}

impl Default for PluginOptions {
    fn default() -> Self {
        Self {
            validator_dirs: vec![PathBuf::from("./plugins/validators")],
            transformer_dirs: vec![PathBuf::from("./plugins/transformers")],
            validator_pattern: "*.validator.yaml".to_string(),
            transformer_pattern: "*.transformer.yaml".to_string(),
            discovery_timeout_ms: 5000,
        }
    }
}

impl PluginOptions {
    /// Discovery time limit
    #[must_use]
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plugin_options() {
        let options = PluginOptions::default();
        assert_eq!(options.discovery_timeout(), Duration::from_secs(5));
        assert_eq!(options.validator_pattern, "*.validator.yaml");
        assert_eq!(options.transformer_dirs, vec![PathBuf::from("./plugins/transformers")]);
    }
}
