//! Error types for template resolution
//!
//! Every stage reports problems as [`ValidationError`] values. They are plain
//! data: collected, combined and returned, never raised.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::variable::VariableStatus;

/// Stable error codes, prefixed by the stage that produced them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Input string was empty or only whitespace
    PipeParseEmptyInput,
    /// Character that cannot start any token
    PipeParseUnexpectedCharacter,
    /// Quoted string without closing quote
    PipeParseUnterminatedString,
    /// Unknown escape sequence inside a quoted string
    PipeParseInvalidEscape,
    /// JSON literal that `serde_json` rejects or that is unbalanced
    PipeParseInvalidJson,
    /// JSON literal larger than the configured byte limit
    PipeParseJsonTooLarge,
    /// Token that does not fit the grammar at this position
    PipeParseUnexpectedToken,
    /// Dotted path deeper than the configured maximum
    PipeParseMaxDepthExceeded,
    /// Path segment longer than the configured maximum
    PipeParseSegmentTooLong,
    /// Reserved property name used as a path segment
    PipeParseReservedName,
    /// Same parameter key declared twice, or scalar/object conflict
    PipeParseDuplicateKey,

    /// Value does not match the declared type, or the type is unknown
    VarTypeMismatch,
    /// Value violates a constraint of its type
    VarConstraintViolation,
    /// Required variable has no value
    VarMissingRequired,
    /// Variable references form a cycle
    VarCircularDependency,
    /// `${NAME}` reference to an undeclared variable
    VarReferenceNotFound,
    /// A referenced variable failed to resolve
    VarDependencyFailed,
    /// Inconsistent variable configuration (required/default, bad params)
    VarInvalidConfiguration,

    /// Plugin could not be loaded
    PluginLoadFailed,
    /// Loaded plugin does not expose the expected capability
    PluginInvalidInterface,
    /// Plugin name already registered
    PluginDuplicateName,
    /// Plugin call or discovery exceeded its time limit
    PluginExecutionTimeout,
    /// Plugin panicked while validating
    PluginExecutionError,

    /// Transform section names an unregistered transformer
    TransformNotFound,
    /// Transformer parameter absent
    TransformMissingParameter,
    /// Transformer parameter present but unusable
    TransformInvalidParameter,
    /// Transformer failed while running
    TransformExecutionError,
}

impl ErrorCode {
    /// Returns the wire name of the code (e.g. `PIPE_PARSE_MAX_DEPTH_EXCEEDED`)
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PipeParseEmptyInput => "PIPE_PARSE_EMPTY_INPUT",
            Self::PipeParseUnexpectedCharacter => "PIPE_PARSE_UNEXPECTED_CHARACTER",
            Self::PipeParseUnterminatedString => "PIPE_PARSE_UNTERMINATED_STRING",
            Self::PipeParseInvalidEscape => "PIPE_PARSE_INVALID_ESCAPE",
            Self::PipeParseInvalidJson => "PIPE_PARSE_INVALID_JSON",
            Self::PipeParseJsonTooLarge => "PIPE_PARSE_JSON_TOO_LARGE",
            Self::PipeParseUnexpectedToken => "PIPE_PARSE_UNEXPECTED_TOKEN",
            Self::PipeParseMaxDepthExceeded => "PIPE_PARSE_MAX_DEPTH_EXCEEDED",
            Self::PipeParseSegmentTooLong => "PIPE_PARSE_SEGMENT_TOO_LONG",
            Self::PipeParseReservedName => "PIPE_PARSE_RESERVED_NAME",
            Self::PipeParseDuplicateKey => "PIPE_PARSE_DUPLICATE_KEY",
            Self::VarTypeMismatch => "VAR_TYPE_MISMATCH",
            Self::VarConstraintViolation => "VAR_CONSTRAINT_VIOLATION",
            Self::VarMissingRequired => "VAR_MISSING_REQUIRED",
            Self::VarCircularDependency => "VAR_CIRCULAR_DEPENDENCY",
            Self::VarReferenceNotFound => "VAR_REFERENCE_NOT_FOUND",
            Self::VarDependencyFailed => "VAR_DEPENDENCY_FAILED",
            Self::VarInvalidConfiguration => "VAR_INVALID_CONFIGURATION",
            Self::PluginLoadFailed => "PLUGIN_LOAD_FAILED",
            Self::PluginInvalidInterface => "PLUGIN_INVALID_INTERFACE",
            Self::PluginDuplicateName => "PLUGIN_DUPLICATE_NAME",
            Self::PluginExecutionTimeout => "PLUGIN_EXECUTION_TIMEOUT",
            Self::PluginExecutionError => "PLUGIN_EXECUTION_ERROR",
            Self::TransformNotFound => "TRANSFORM_NOT_FOUND",
            Self::TransformMissingParameter => "TRANSFORM_MISSING_PARAMETER",
            Self::TransformInvalidParameter => "TRANSFORM_INVALID_PARAMETER",
            Self::TransformExecutionError => "TRANSFORM_EXECUTION_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How serious a reported problem is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational note
    Info,
    /// Non-blocking unless strict mode is on
    Warning,
    /// Blocking
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Where in the template a problem was found
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    /// Template file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// 1-based line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// 1-based column within the pipe string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
    /// Variable name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
}

impl SourceLocation {
    /// Location pointing at a variable
    #[must_use]
    pub fn variable(name: impl Into<String>) -> Self {
        Self {
            variable: Some(name.into()),
            ..Self::default()
        }
    }

    /// Location pointing at a line/column position
    #[must_use]
    pub fn at(line: usize, column: usize) -> Self {
        Self {
            line: Some(line),
            column: Some(column),
            ..Self::default()
        }
    }

    /// Fills fields that are still empty from `other`
    pub fn merge_missing(&mut self, other: &SourceLocation) {
        if self.file.is_none() {
            self.file.clone_from(&other.file);
        }
        if self.line.is_none() {
            self.line = other.line;
        }
        if self.column.is_none() {
            self.column = other.column;
        }
        if self.variable.is_none() {
            self.variable.clone_from(&other.variable);
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(file) = &self.file {
            parts.push(file.clone());
        }
        match (self.line, self.column) {
            (Some(line), Some(column)) => parts.push(format!("{line}:{column}")),
            (Some(line), None) => parts.push(line.to_string()),
            _ => {}
        }
        if let Some(variable) = &self.variable {
            parts.push(format!("${{{variable}}}"));
        }
        write!(f, "{}", parts.join(" "))
    }
}

/// A single structured problem report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    /// Stable error code
    pub code: ErrorCode,
    /// Human readable description
    pub message: String,
    /// Severity
    pub severity: Severity,
    /// Source position
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceLocation>,
    /// What was expected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    /// What was found
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    /// How to fix it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ValidationError {
    /// Creates an error-severity report
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            severity: Severity::Error,
            source: None,
            expected: None,
            actual: None,
            suggestion: None,
        }
    }

    /// Creates a warning-severity report
    #[must_use]
    pub fn warning(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message).with_severity(Severity::Warning)
    }

    /// Sets the severity
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Sets the source location
    #[must_use]
    pub fn with_source(mut self, source: SourceLocation) -> Self {
        self.source = Some(source);
        self
    }

    /// Sets a line/column position, keeping other location fields
    #[must_use]
    pub fn at(mut self, line: usize, column: usize) -> Self {
        let source = self.source.get_or_insert_with(SourceLocation::default);
        source.line = Some(line);
        source.column = Some(column);
        self
    }

    /// Sets the expected value description
    #[must_use]
    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    /// Sets the actual value description
    #[must_use]
    pub fn with_actual(mut self, actual: impl Into<String>) -> Self {
        self.actual = Some(actual.into());
        self
    }

    /// Sets a fix suggestion
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attributes the error to a variable, filling only missing location fields
    #[must_use]
    pub fn attributed_to(mut self, location: &SourceLocation) -> Self {
        match &mut self.source {
            Some(source) => source.merge_missing(location),
            None => self.source = Some(location.clone()),
        }
        self
    }

    /// Returns true for error severity
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Variable this error is attributed to, if any
    #[must_use]
    pub fn variable(&self) -> Option<&str> {
        self.source.as_ref().and_then(|s| s.variable.as_deref())
    }
}

// `source` is a location, not a cause, so thiserror's derive does not apply.
impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Errors raised by plugin registration and discovery
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PluginError {
    /// Name already taken within the registry
    #[error("{kind} '{name}' is already registered")]
    DuplicateName {
        /// "validator" or "transformer"
        kind: String,
        /// Conflicting name
        name: String,
    },

    /// Plugin file does not expose the expected capability
    #[error("invalid plugin interface in '{path}': {reason}")]
    InvalidInterface {
        /// Plugin file
        path: String,
        /// What is wrong
        reason: String,
    },

    /// Plugin file could not be loaded
    #[error("failed to load plugin '{path}': {reason}")]
    LoadFailed {
        /// Plugin file
        path: String,
        /// What failed
        reason: String,
    },

    /// Discovery did not finish in time
    #[error("plugin discovery in '{path}' timed out after {timeout:?}")]
    DiscoveryTimeout {
        /// Directory being scanned
        path: String,
        /// Configured limit
        timeout: Duration,
    },
}

impl PluginError {
    /// Error code for this plugin error
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::DuplicateName { .. } => ErrorCode::PluginDuplicateName,
            Self::InvalidInterface { .. } => ErrorCode::PluginInvalidInterface,
            Self::LoadFailed { .. } => ErrorCode::PluginLoadFailed,
            Self::DiscoveryTimeout { .. } => ErrorCode::PluginExecutionTimeout,
        }
    }
}

impl From<PluginError> for ValidationError {
    fn from(err: PluginError) -> Self {
        let source = match &err {
            PluginError::InvalidInterface { path, .. }
            | PluginError::LoadFailed { path, .. }
            | PluginError::DiscoveryTimeout { path, .. } => Some(SourceLocation {
                file: Some(path.clone()),
                ..SourceLocation::default()
            }),
            PluginError::DuplicateName { .. } => None,
        };
        let mut error = ValidationError::new(err.code(), err.to_string());
        error.source = source;
        error
    }
}

/// Every error and warning collected by a failed run
#[derive(Debug, Error, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("{} error(s), {} warning(s)", .errors.len(), .warnings.len())]
pub struct AggregatedErrors {
    /// Blocking problems, in discovery order
    pub errors: Vec<ValidationError>,
    /// Non-blocking problems
    pub warnings: Vec<ValidationError>,
    /// Final state of every variable, in declaration order
    #[serde(default)]
    pub states: Vec<VariableStatus>,
}

impl AggregatedErrors {
    /// Errors attributed to the given variable
    pub fn for_variable<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ValidationError> {
        self.errors
            .iter()
            .filter(move |e| e.variable() == Some(name))
    }

    /// Returns true if any error carries the given code
    #[must_use]
    pub fn has_code(&self, code: ErrorCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }
}
