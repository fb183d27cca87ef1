//! Plugin registry
//!
//! Validators are keyed by the type they validate, transformers by transform
//! name. Explicit registration and directory discovery share one namespace
//! per kind: the first plugin registered under a name keeps it and later
//! attempts fail with `PLUGIN_DUPLICATE_NAME`.

use serde::Serialize;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::PluginOptions;
use super::builtin;
use super::discovery::{self, LoadOutcome, LoadedPlugin, PluginLoader};
use super::traits::{PluginKind, Transformer, Validator};
use crate::errors::PluginError;

/// Names currently registered, sorted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PluginListing {
    /// Validator names
    pub validators: Vec<String>,
    /// Transformer names
    pub transformers: Vec<String>,
}

/// Outcome of a discovery pass that finished in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Names registered by this pass
    pub registered: Vec<String>,
    /// Per-file failures
    pub errors: Vec<PluginError>,
}

impl DiscoveryReport {
    /// Returns true if every matching file was registered
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Registry owning every validator and transformer instance
#[derive(Default)]
pub struct PluginRegistry {
    validators: HashMap<String, Box<dyn Validator>>,
    transformers: HashMap<String, Box<dyn Transformer>>,
}

impl PluginRegistry {
    /// Creates an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every built-in plugin registered
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for error in builtin::register_builtins(&mut registry) {
            // empty registry: only reachable if two built-ins share a name
            warn!(error = %error, "built-in plugin not registered");
        }
        registry
    }

    /// Registers a validator
    ///
    /// # Errors
    ///
    /// Returns `DuplicateName` if a validator with the same name exists; the
    /// existing one is kept.
    pub fn register_validator(&mut self, validator: impl Validator + 'static) -> Result<(), PluginError> {
        self.insert_validator(Box::new(validator))
    }

    /// Registers a transformer
    ///
    /// # Errors
    ///
    /// Returns `DuplicateName` if a transformer with the same name exists; the
    /// existing one is kept.
    pub fn register_transformer(
        &mut self,
        transformer: impl Transformer + 'static,
    ) -> Result<(), PluginError> {
        self.insert_transformer(Box::new(transformer))
    }

    fn insert_validator(&mut self, validator: Box<dyn Validator>) -> Result<(), PluginError> {
        let name = validator.metadata().name.clone();
        match self.validators.entry(name) {
            Entry::Occupied(entry) => Err(duplicate(PluginKind::Validator, entry.key())),
            Entry::Vacant(entry) => {
                debug!(name = %entry.key(), "registered validator");
                entry.insert(validator);
                Ok(())
            }
        }
    }

    fn insert_transformer(&mut self, transformer: Box<dyn Transformer>) -> Result<(), PluginError> {
        let name = transformer.metadata().name.clone();
        match self.transformers.entry(name) {
            Entry::Occupied(entry) => Err(duplicate(PluginKind::Transformer, entry.key())),
            Entry::Vacant(entry) => {
                debug!(name = %entry.key(), "registered transformer");
                entry.insert(transformer);
                Ok(())
            }
        }
    }

    /// Registers a plugin of either kind
    ///
    /// # Errors
    ///
    /// Returns `DuplicateName` on a name collision within the plugin's kind.
    pub fn register(&mut self, plugin: LoadedPlugin) -> Result<(), PluginError> {
        match plugin {
            LoadedPlugin::Validator(v) => self.insert_validator(v),
            LoadedPlugin::Transformer(t) => self.insert_transformer(t),
        }
    }

    /// Discovers plugins under `plugin_path` and registers them
    ///
    /// Files whose name matches `pattern` are loaded with `loader`. Per-file
    /// failures, including name collisions, are returned in the report.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryTimeout` if scanning and loading take longer than
    /// `timeout`. Nothing is registered in that case.
    pub async fn discover_and_register(
        &mut self,
        plugin_path: impl AsRef<Path>,
        pattern: &str,
        loader: &dyn PluginLoader,
        timeout: Duration,
    ) -> Result<DiscoveryReport, PluginError> {
        let deadline = Instant::now() + timeout;
        let staged = load_until(plugin_path.as_ref(), pattern, loader, deadline, timeout).await?;
        Ok(self.register_staged(staged))
    }

    /// Runs discovery over the configured validator and transformer
    /// directories under a single time limit. Missing directories are skipped.
    ///
    /// Every directory is loaded before anything is registered.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryTimeout` if the whole pass exceeds the configured
    /// discovery timeout. Nothing is registered in that case.
    pub async fn discover_configured(
        &mut self,
        options: &PluginOptions,
        loader: &dyn PluginLoader,
    ) -> Result<DiscoveryReport, PluginError> {
        let timeout = options.discovery_timeout();
        let deadline = Instant::now() + timeout;
        let mut staged = LoadOutcome::default();
        let passes = [
            (&options.validator_dirs, options.validator_pattern.as_str()),
            (&options.transformer_dirs, options.transformer_pattern.as_str()),
        ];
        for (dirs, pattern) in passes {
            for dir in dirs {
                if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
                    debug!(path = %dir.display(), "plugin directory not found, skipping");
                    continue;
                }
                let outcome = load_until(dir, pattern, loader, deadline, timeout).await?;
                staged.plugins.extend(outcome.plugins);
                staged.errors.extend(outcome.errors);
            }
        }
        Ok(self.register_staged(staged))
    }

    fn register_staged(&mut self, staged: LoadOutcome) -> DiscoveryReport {
        let mut report = DiscoveryReport {
            registered: Vec::new(),
            errors: staged.errors,
        };
        for (path, plugin) in staged.plugins {
            let name = plugin.metadata().name.clone();
            match self.register(plugin) {
                Ok(()) => report.registered.push(name),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "discovered plugin rejected");
                    report.errors.push(e);
                }
            }
        }
        info!(
            registered = report.registered.len(),
            failed = report.errors.len(),
            "plugin discovery finished"
        );
        report
    }

    /// Validator for a type
    #[must_use]
    pub fn validator(&self, type_name: &str) -> Option<&dyn Validator> {
        self.validators.get(type_name).map(AsRef::as_ref)
    }

    /// Transformer by name
    #[must_use]
    pub fn transformer(&self, name: &str) -> Option<&dyn Transformer> {
        self.transformers.get(name).map(AsRef::as_ref)
    }

    /// Registered names
    #[must_use]
    pub fn list(&self) -> PluginListing {
        let mut validators: Vec<String> = self.validators.keys().cloned().collect();
        let mut transformers: Vec<String> = self.transformers.keys().cloned().collect();
        validators.sort();
        transformers.sort();
        PluginListing {
            validators,
            transformers,
        }
    }

    /// Removes every plugin
    pub fn clear(&mut self) {
        self.validators.clear();
        self.transformers.clear();
    }

    /// Returns true if nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty() && self.transformers.is_empty()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listing = self.list();
        f.debug_struct("PluginRegistry")
            .field("validators", &listing.validators)
            .field("transformers", &listing.transformers)
            .finish()
    }
}

fn duplicate(kind: PluginKind, name: &str) -> PluginError {
    PluginError::DuplicateName {
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

/// Loads every matching file under `plugin_path`, giving up at `deadline`
async fn load_until(
    plugin_path: &Path,
    pattern: &str,
    loader: &dyn PluginLoader,
    deadline: Instant,
    timeout: Duration,
) -> Result<LoadOutcome, PluginError> {
    info!(path = %plugin_path.display(), pattern, "discovering plugins");
    tokio::time::timeout_at(deadline, discovery::load_all(plugin_path, pattern, loader))
        .await
        .map_err(|_| {
            warn!(path = %plugin_path.display(), ?timeout, "plugin discovery timed out");
            PluginError::DiscoveryTimeout {
                path: plugin_path.display().to_string(),
                timeout,
            }
        })
}
