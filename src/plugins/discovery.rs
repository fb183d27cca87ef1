//! Plugin discovery
//!
//! Discovery walks a plugin directory, picks files whose name matches a glob
//! pattern and hands each one to a [`PluginLoader`]. Plugins are compiled into
//! the binary: the default [`CatalogLoader`] reads a small YAML manifest per
//! file and instantiates the catalog entry it names.

use async_trait::async_trait;
use futures::FutureExt;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::builtin;
use super::traits::{PluginKind, PluginMetadata, Transformer, Validator};
use crate::engine::panic_message;
use crate::errors::PluginError;

/// A plugin instance produced by a loader
pub enum LoadedPlugin {
    /// Validator capability
    Validator(Box<dyn Validator>),
    /// Transformer capability
    Transformer(Box<dyn Transformer>),
}

impl LoadedPlugin {
    /// Capability of the plugin
    #[must_use]
    pub fn kind(&self) -> PluginKind {
        match self {
            Self::Validator(_) => PluginKind::Validator,
            Self::Transformer(_) => PluginKind::Transformer,
        }
    }

    /// Plugin metadata
    #[must_use]
    pub fn metadata(&self) -> &PluginMetadata {
        match self {
            Self::Validator(v) => v.metadata(),
            Self::Transformer(t) => t.metadata(),
        }
    }
}

impl fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("kind", &self.kind())
            .field("metadata", self.metadata())
            .finish()
    }
}

/// Turns a discovered file into a plugin instance
#[async_trait]
pub trait PluginLoader: Send + Sync {
    /// Loads the plugin described by `path`
    ///
    /// # Errors
    ///
    /// Returns `LoadFailed` when the file cannot be read or names nothing
    /// loadable, `InvalidInterface` when its contents are malformed.
    async fn load(&self, path: &Path) -> Result<LoadedPlugin, PluginError>;
}

/// Manifest file contents
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginManifest {
    /// Name to register under
    pub name: String,
    /// Plugin version
    pub version: String,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
    /// Author
    #[serde(default)]
    pub author: Option<String>,
    /// Catalog entry to instantiate
    pub entry: String,
}

impl PluginManifest {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            name: self.name.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            author: self.author.clone(),
        }
    }
}

/// Builds a plugin under the given metadata
pub type PluginFactory = Arc<dyn Fn(PluginMetadata) -> LoadedPlugin + Send + Sync>;

/// Loader backed by a catalog of compiled plugin factories
#[derive(Clone, Default)]
pub struct CatalogLoader {
    entries: HashMap<String, PluginFactory>,
}

impl CatalogLoader {
    /// Empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog containing every built-in plugin under its own name
    #[must_use]
    pub fn builtin() -> Self {
        builtin::catalog_entries()
            .into_iter()
            .fold(Self::new(), |catalog, (entry, factory)| {
                catalog.with_entry(entry, factory)
            })
    }

    /// Adds (or replaces) a catalog entry
    #[must_use]
    pub fn with_entry(mut self, entry: impl Into<String>, factory: PluginFactory) -> Self {
        self.entries.insert(entry.into(), factory);
        self
    }

    /// Catalog entry names, sorted
    #[must_use]
    pub fn entries(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for CatalogLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogLoader")
            .field("entries", &self.entries())
            .finish()
    }
}

#[async_trait]
impl PluginLoader for CatalogLoader {
    async fn load(&self, path: &Path) -> Result<LoadedPlugin, PluginError> {
        let display = path.display().to_string();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PluginError::LoadFailed {
                path: display.clone(),
                reason: e.to_string(),
            })?;
        let manifest: PluginManifest =
            serde_yaml::from_str(&text).map_err(|e| PluginError::InvalidInterface {
                path: display.clone(),
                reason: format!("malformed manifest: {e}"),
            })?;
        let factory = self
            .entries
            .get(&manifest.entry)
            .ok_or_else(|| PluginError::LoadFailed {
                path: display,
                reason: format!("no catalog entry named '{}'", manifest.entry),
            })?;
        Ok(factory(manifest.metadata()))
    }
}

/// Plugins loaded from one directory, plus the per-file failures
#[derive(Debug, Default)]
pub(crate) struct LoadOutcome {
    pub plugins: Vec<(PathBuf, LoadedPlugin)>,
    pub errors: Vec<PluginError>,
}

/// Loads every file under `root` whose name matches `pattern`
///
/// Never stops early: each failing file adds one error and the walk goes on.
pub(crate) async fn load_all(root: &Path, pattern: &str, loader: &dyn PluginLoader) -> LoadOutcome {
    let mut outcome = LoadOutcome::default();

    let pattern = match glob::Pattern::new(pattern) {
        Ok(p) => p,
        Err(e) => {
            outcome.errors.push(PluginError::LoadFailed {
                path: pattern.to_string(),
                reason: format!("invalid glob pattern: {e}"),
            });
            return outcome;
        }
    };

    let (files, skipped) = scan(root, &pattern).await;
    outcome.errors.extend(skipped);

    for path in files {
        debug!(path = %path.display(), "loading plugin candidate");
        let loaded = match AssertUnwindSafe(loader.load(&path)).catch_unwind().await {
            Ok(loaded) => loaded,
            Err(payload) => Err(PluginError::LoadFailed {
                path: path.display().to_string(),
                reason: format!("loader panicked: {}", panic_message(payload.as_ref())),
            }),
        };
        match loaded {
            Ok(plugin) => match PluginKind::from_path(&path) {
                Some(expected) if expected != plugin.kind() => {
                    warn!(path = %path.display(), "plugin exposes the wrong capability");
                    outcome.errors.push(PluginError::InvalidInterface {
                        path: path.display().to_string(),
                        reason: format!(
                            "file is named as a {expected} but provides a {}",
                            plugin.kind()
                        ),
                    });
                }
                _ => outcome.plugins.push((path, plugin)),
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load plugin");
                outcome.errors.push(e);
            }
        }
    }
    outcome
}

fn unreadable(path: &Path, error: &io::Error) -> PluginError {
    warn!(path = %path.display(), %error, "cannot read plugin path");
    PluginError::LoadFailed {
        path: path.display().to_string(),
        reason: format!("cannot read: {error}"),
    }
}

/// Recursively lists files under `root` matching `pattern`, sorted
///
/// Symbolic links are followed; a directory reached twice is walked once.
/// Paths that cannot be read are returned as errors and skipped.
async fn scan(root: &Path, pattern: &glob::Pattern) -> (Vec<PathBuf>, Vec<PluginError>) {
    let mut files = Vec::new();
    let mut errors = Vec::new();
    let mut walked = HashSet::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        match tokio::fs::canonicalize(&dir).await {
            Ok(real) if !walked.insert(real.clone()) => continue,
            Ok(_) => {}
            Err(e) => {
                errors.push(unreadable(&dir, &e));
                continue;
            }
        }
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                errors.push(unreadable(&dir, &e));
                continue;
            }
        };
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    errors.push(unreadable(&dir, &e));
                    break;
                }
            };
            let path = entry.path();
            let metadata = match tokio::fs::metadata(&path).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    errors.push(unreadable(&path, &e));
                    continue;
                }
            };
            if metadata.is_dir() {
                stack.push(path);
            } else if metadata.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| pattern.matches(n))
            {
                files.push(path);
            }
        }
    }
    files.sort();
    (files, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn test_catalog_loader_renames_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "shout.transformer.yaml",
            "name: shout\nversion: 1.0.0\nentry: uppercase\nauthor: ops\n",
        );
        let plugin = CatalogLoader::builtin().load(&path).await.unwrap();
        assert_eq!(plugin.kind(), PluginKind::Transformer);
        assert_eq!(plugin.metadata().name, "shout");
        assert_eq!(plugin.metadata().author.as_deref(), Some("ops"));
    }

    #[tokio::test]
    async fn test_catalog_loader_errors() {
        let dir = tempfile::tempdir().unwrap();
        let unknown = write(
            dir.path(),
            "a.validator.yaml",
            "name: a\nversion: 1.0.0\nentry: nope\n",
        );
        let malformed = write(dir.path(), "b.validator.yaml", "name: b\n");
        let loader = CatalogLoader::builtin();

        let err = loader.load(&unknown).await.unwrap_err();
        assert!(matches!(err, PluginError::LoadFailed { .. }));
        let err = loader.load(&malformed).await.unwrap_err();
        assert!(matches!(err, PluginError::InvalidInterface { .. }));
        let err = loader.load(&dir.path().join("missing.yaml")).await.unwrap_err();
        assert!(matches!(err, PluginError::LoadFailed { .. }));
    }

    #[tokio::test]
    async fn test_scan_is_recursive_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        write(dir.path(), "b.validator.yaml", "");
        write(&dir.path().join("nested"), "a.validator.yaml", "");
        write(dir.path(), "c.transformer.yaml", "");
        let pattern = glob::Pattern::new("*.validator.yaml").unwrap();
        let (files, errors) = scan(dir.path(), &pattern).await;
        assert!(errors.is_empty());
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![PathBuf::from("b.validator.yaml"), PathBuf::from("nested/a.validator.yaml")]
        );
    }

    #[tokio::test]
    async fn test_load_all_rejects_capability_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "upper.validator.yaml",
            "name: upper\nversion: 1.0.0\nentry: uppercase\n",
        );
        let outcome = load_all(dir.path(), "*.validator.yaml", &CatalogLoader::builtin()).await;
        assert!(outcome.plugins.is_empty());
        assert!(matches!(
            outcome.errors.as_slice(),
            [PluginError::InvalidInterface { .. }]
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_entry_does_not_stop_the_walk() {
        use std::os::unix::fs::symlink;
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "region.validator.yaml",
            "name: region\nversion: 1.0.0\nentry: enum\n",
        );
        symlink(dir.path().join("gone"), dir.path().join("broken.validator.yaml")).unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        symlink(dir.path(), dir.path().join("nested").join("loop")).unwrap();

        let outcome = load_all(dir.path(), "*.validator.yaml", &CatalogLoader::builtin()).await;
        let names: Vec<_> = outcome.plugins.iter().map(|(_, p)| p.metadata().name.as_str()).collect();
        assert_eq!(names, vec!["region"]);
        match outcome.errors.as_slice() {
            [PluginError::LoadFailed { path, .. }] => assert!(path.ends_with("broken.validator.yaml")),
            other => panic!("unexpected errors: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_root_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = load_all(&dir.path().join("absent"), "*", &CatalogLoader::builtin()).await;
        assert!(outcome.plugins.is_empty());
        assert!(matches!(outcome.errors.as_slice(), [PluginError::LoadFailed { .. }]));
    }

    struct Exploding;

    #[async_trait]
    impl PluginLoader for Exploding {
        async fn load(&self, path: &Path) -> Result<LoadedPlugin, PluginError> {
            if path.ends_with("bad.validator.yaml") {
                panic!("manifest reader crashed");
            }
            CatalogLoader::builtin().load(path).await
        }
    }

    #[tokio::test]
    async fn test_panicking_loader_fails_only_its_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bad.validator.yaml", "");
        write(
            dir.path(),
            "good.validator.yaml",
            "name: good\nversion: 1.0.0\nentry: string\n",
        );
        let outcome = load_all(dir.path(), "*.validator.yaml", &Exploding).await;
        assert_eq!(outcome.plugins.len(), 1);
        match outcome.errors.as_slice() {
            [PluginError::LoadFailed { reason, .. }] => {
                assert!(reason.contains("manifest reader crashed"));
            }
            other => panic!("unexpected errors: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_load_all_bad_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = load_all(dir.path(), "[", &CatalogLoader::builtin()).await;
        assert_eq!(outcome.errors.len(), 1);
    }
}
