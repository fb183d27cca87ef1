//! Prelude module for common imports

// Re-export macros
pub use crate::variables;

// Resolution
pub use crate::engine::{ResolveOptions, ResolvedVariables, Resolver};
pub use crate::variable::{RawVariable, VariableDefinition, VariableState, VariableStatus};

// Errors and results
pub use crate::errors::{AggregatedErrors, ErrorCode, Severity, SourceLocation, ValidationError};
pub use crate::outcome::ValidationResult;

// Plugins
pub use crate::plugins::{
    CatalogLoader, Params, PluginMetadata, PluginRegistry, Transformer, Validator, VariableContext,
};

// Pipe syntax
pub use crate::syntax::{ParserOptions, PipeConfig, PipeParser};
