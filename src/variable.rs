//! Template variables
//!
//! A [`RawVariable`] is what the document parser hands over: a name, its pipe
//! string and an optional supplied value. Parsing the pipe string turns it
//! into a [`VariableDefinition`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::errors::SourceLocation;
use crate::graph::extract_references;
use crate::syntax::{PipeConfig, TransformStep};

/// Variable as declared in a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVariable {
    /// Variable name
    pub name: String,
    /// Pipe string, e.g. `string|minLength:3`
    pub pipe: String,
    /// Template line of the declaration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_line: Option<usize>,
    /// Template file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    /// Supplied value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl RawVariable {
    /// Creates a variable without a supplied value
    #[must_use]
    pub fn new(name: impl Into<String>, pipe: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pipe: pipe.into(),
            source_line: None,
            source_file: None,
            value: None,
        }
    }

    /// Sets the supplied value
    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Sets the declaration line
    #[must_use]
    pub fn at_line(mut self, line: usize) -> Self {
        self.source_line = Some(line);
        self
    }

    /// Sets the template file
    #[must_use]
    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.source_file = Some(file.into());
        self
    }

    /// Location of the declaration
    #[must_use]
    pub fn location(&self) -> SourceLocation {
        SourceLocation {
            file: self.source_file.clone(),
            line: self.source_line,
            column: None,
            variable: Some(self.name.clone()),
        }
    }
}

/// Parsed variable, ready for ordering and validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableDefinition {
    /// Variable name
    pub name: String,
    /// Type, used to pick the validator
    #[serde(rename = "type")]
    pub type_name: String,
    /// Validator parameters
    pub params: Map<String, Value>,
    /// Template line of the declaration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_line: Option<usize>,
    /// Template file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    /// Supplied value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Whether a value must be supplied
    pub required: bool,
    /// Value used when none is supplied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    /// Human readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Names referenced with `${NAME}` by the effective value
    pub dependencies: Vec<String>,
    /// Transform steps in declaration order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<TransformStep>,
}

impl VariableDefinition {
    /// Builds a definition from a declaration and its parsed pipe string
    #[must_use]
    pub fn from_parts(raw: RawVariable, config: PipeConfig) -> Self {
        let description = config
            .params
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);
        let mut definition = Self {
            name: raw.name,
            type_name: config.type_name,
            params: config.params,
            source_line: raw.source_line,
            source_file: raw.source_file,
            value: raw.value,
            required: config.required,
            default_value: config.default,
            description,
            dependencies: Vec::new(),
            transforms: config.transforms,
        };
        definition.dependencies = definition
            .effective_value()
            .map(extract_references)
            .unwrap_or_default();
        definition
    }

    /// Supplied value, or the default when none was supplied
    #[must_use]
    pub fn effective_value(&self) -> Option<&str> {
        self.value.as_deref().or(self.default_value.as_deref())
    }

    /// Default that needs no other variable to be resolved
    #[must_use]
    pub fn usable_default(&self) -> Option<&str> {
        self.default_value
            .as_deref()
            .filter(|default| extract_references(default).is_empty())
    }

    /// Location of the declaration
    #[must_use]
    pub fn location(&self) -> SourceLocation {
        SourceLocation {
            file: self.source_file.clone(),
            line: self.source_line,
            column: None,
            variable: Some(self.name.clone()),
        }
    }
}

/// Where a variable stopped on its way through a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariableState {
    /// Not processed yet
    Unresolved,
    /// Pipe string parsed
    Parsed,
    /// Pipe string rejected
    ParseError,
    /// Placed in the resolution order
    GraphOrdered,
    /// Part of an unbreakable cycle
    CircularError,
    /// Skipped because a referenced variable failed or is missing
    DependencyFailed,
    /// Value accepted by its validator
    Validated,
    /// Value rejected
    ValidationError,
    /// Transform chain applied
    Transformed,
    /// A transform step failed
    TransformError,
    /// Final value available
    Resolved,
}

impl VariableState {
    /// Returns true for states a variable cannot leave
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Self::ParseError
                | Self::CircularError
                | Self::DependencyFailed
                | Self::ValidationError
                | Self::TransformError
        )
    }
}

impl fmt::Display for VariableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Unresolved => "unresolved",
            Self::Parsed => "parsed",
            Self::ParseError => "parse error",
            Self::GraphOrdered => "ordered",
            Self::CircularError => "circular",
            Self::DependencyFailed => "dependency failed",
            Self::Validated => "validated",
            Self::ValidationError => "invalid",
            Self::Transformed => "transformed",
            Self::TransformError => "transform failed",
            Self::Resolved => "resolved",
        };
        f.write_str(text)
    }
}

/// Final state of one variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableStatus {
    /// Variable name
    pub name: String,
    /// Last state reached
    pub state: VariableState,
    /// States passed through before `state`, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<VariableState>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: serde_json::Value) -> PipeConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_definition_from_parts() {
        let raw = RawVariable::new("URL", "string|default:http://${HOST}:${PORT}")
            .at_line(4)
            .in_file("env.yaml");
        let definition = VariableDefinition::from_parts(
            raw,
            config(json!({
                "type": "string",
                "params": {"description": "Service URL"},
                "default": "http://${HOST}:${PORT}"
            })),
        );
        assert_eq!(definition.dependencies, vec!["HOST", "PORT"]);
        assert_eq!(definition.description.as_deref(), Some("Service URL"));
        assert_eq!(definition.usable_default(), None);
        assert_eq!(definition.location().to_string(), "env.yaml 4 ${URL}");
    }

    #[test]
    fn test_supplied_value_wins_over_default() {
        let raw = RawVariable::new("HOST", "string|default:${FALLBACK}").with_value("example.com");
        let definition = VariableDefinition::from_parts(
            raw,
            config(json!({"type": "string", "params": {}, "default": "${FALLBACK}"})),
        );
        assert_eq!(definition.effective_value(), Some("example.com"));
        assert!(definition.dependencies.is_empty());
    }

    #[test]
    fn test_variables_macro() {
        let vars = crate::variables! {
            HOST => "string|default:localhost",
            PORT => "port|required" = "8080",
        };
        assert_eq!(vars[0].name, "HOST");
        assert_eq!(vars[1].value.as_deref(), Some("8080"));
    }

    #[test]
    fn test_failure_states() {
        assert!(VariableState::CircularError.is_failure());
        assert!(!VariableState::Resolved.is_failure());
        assert_eq!(
            serde_json::to_value(VariableState::ParseError).unwrap(),
            json!("PARSE_ERROR")
        );
    }
}
