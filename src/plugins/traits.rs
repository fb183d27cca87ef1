//! Plugin capability traits
//!
//! Validators check a resolved value, transformers derive a new one. Both are
//! stateless and async so an implementation may suspend, and both report
//! problems as data instead of panicking.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::errors::ValidationError;
use crate::outcome::ValidationResult;

/// Parameter object handed to plugins, nested by dotted path
pub type Params = Map<String, Value>;

/// Identity of a plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Registry key
    pub name: String,
    /// Plugin version
    pub version: String,
    /// Short description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Author
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl PluginMetadata {
    /// Creates metadata with a name and version
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
            author: None,
        }
    }

    /// Metadata for a plugin shipped with this crate
    #[must_use]
    pub fn builtin(name: &str, description: &str) -> Self {
        Self::new(name, crate::VERSION).with_description(description)
    }

    /// Sets the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the author
    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }
}

/// The two plugin capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    /// Implements [`Validator`]
    Validator,
    /// Implements [`Transformer`]
    Transformer,
}

impl PluginKind {
    /// Kind implied by a `*.validator.*` / `*.transformer.*` file name
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        if name.contains(".validator.") {
            Some(Self::Validator)
        } else if name.contains(".transformer.") {
            Some(Self::Transformer)
        } else {
            None
        }
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validator => write!(f, "validator"),
            Self::Transformer => write!(f, "transformer"),
        }
    }
}

/// Checks a value against type-specific rules
#[async_trait]
pub trait Validator: Send + Sync {
    /// Plugin identity; `metadata().name` is the type it validates
    fn metadata(&self) -> &PluginMetadata;

    /// Validates `value`. Must report problems in the result, not by panicking.
    async fn validate(&self, value: &str, params: &Params) -> ValidationResult;
}

/// Derives a new value from an existing one
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Plugin identity; `metadata().name` is the transform name
    fn metadata(&self) -> &PluginMetadata;

    /// Transforms `value`
    ///
    /// # Errors
    ///
    /// Returns a `TRANSFORM_*` error when parameters are unusable or the
    /// transformation fails.
    async fn transform(
        &self,
        value: &str,
        params: &Params,
        context: &VariableContext<'_>,
    ) -> Result<String, ValidationError>;
}

/// Read-only view of already resolved variables, given to transformers
#[derive(Debug, Clone, Copy)]
pub struct VariableContext<'a> {
    variables: &'a HashMap<String, String>,
    current_variable: &'a str,
}

impl<'a> VariableContext<'a> {
    /// Creates a context for transforming `current_variable`
    #[must_use]
    pub fn new(variables: &'a HashMap<String, String>, current_variable: &'a str) -> Self {
        Self {
            variables,
            current_variable,
        }
    }

    /// Resolved value of another variable
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&'a str> {
        self.variables.get(name).map(String::as_str)
    }

    /// All resolved variables
    #[must_use]
    pub fn variables(&self) -> &'a HashMap<String, String> {
        self.variables
    }

    /// Name of the variable being transformed
    #[must_use]
    pub fn current_variable(&self) -> &'a str {
        self.current_variable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_kind_from_path() {
        assert_eq!(
            PluginKind::from_path(&PathBuf::from("plugins/semver.validator.yaml")),
            Some(PluginKind::Validator)
        );
        assert_eq!(
            PluginKind::from_path(&PathBuf::from("slug.transformer.yaml")),
            Some(PluginKind::Transformer)
        );
        assert_eq!(PluginKind::from_path(&PathBuf::from("readme.md")), None);
    }

    #[test]
    fn test_context_is_read_only_view() {
        let resolved = HashMap::from([("HOST".to_string(), "localhost".to_string())]);
        let context = VariableContext::new(&resolved, "URL");
        assert_eq!(context.get("HOST"), Some("localhost"));
        assert_eq!(context.get("URL"), None);
        assert_eq!(context.current_variable(), "URL");
    }

    #[test]
    fn test_builtin_metadata() {
        let metadata = PluginMetadata::builtin("string", "Text values").with_author("envpipe");
        assert_eq!(metadata.version, crate::VERSION);
        assert_eq!(metadata.author.as_deref(), Some("envpipe"));
    }
}
