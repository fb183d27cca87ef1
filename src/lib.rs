//! # envpipe - Pipe-syntax environment template resolver
//!
//! envpipe resolves environment-configuration templates. Every declared
//! variable carries a pipe string describing its type, constraints, default
//! and transformations:
//!
//! ```text
//! API_URL: "url|schemes:https|default:\"https://${HOST}:${PORT}\"|transform:trim"
//! ```
//!
//! Resolution parses every pipe, orders variables by their `${NAME}`
//! references, then validates and transforms them layer by layer. No stage
//! stops at the first problem: a failed run reports every error at once.
//!
//! ## Quick Start
//!
//! ```
//! use envpipe::prelude::*;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let registry = PluginRegistry::with_builtins();
//! let vars = variables! {
//!     HOST => "string|default:localhost",
//!     PORT => "port|required" = "8080",
//!     URL  => r#"url|default:"http://${HOST}:${PORT}""#,
//! };
//! let resolved = envpipe::run(vars, &registry, ResolveOptions::default()).await.unwrap();
//! assert_eq!(resolved.get("URL"), Some("http://localhost:8080"));
//! # });
//! ```
//!
//! ## Features
//!
//! - **Pipe grammar**: dotted parameter paths, JSON literals, `required`,
//!   `default:` and `transform:` sections
//! - **Plugins**: async validators and transformers, registered explicitly or
//!   discovered from manifest files
//! - **Reference graph**: layered topological order with cycle detection
//! - **Aggregated errors**: coded, serializable errors attributed to the
//!   variable and source line they came from
//!
//! ## License
//!
//! Licensed under either of
//! - Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <https://www.apache.org/licenses/LICENSE-2.0>)
//! - MIT license ([LICENSE-MIT](LICENSE-MIT) or <https://opensource.org/licenses/MIT>)
//!
//! at your option.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod macros;

pub mod engine;
pub mod errors;
pub mod graph;
pub mod infrastructure;
pub mod outcome;
pub mod plugins;
pub mod syntax;
pub mod variable;

// Prelude module for common imports
pub mod prelude;

// Re-export commonly used types
pub use engine::{ResolveOptions, ResolvedVariable, ResolvedVariables, Resolver, run};
pub use errors::{AggregatedErrors, ErrorCode, PluginError, Severity, SourceLocation, ValidationError};
pub use infrastructure::{Config, ConfigError, init_logging};
pub use outcome::ValidationResult;
pub use plugins::{PluginMetadata, PluginRegistry, Transformer, Validator, VariableContext};
pub use syntax::{ParserOptions, PipeConfig, PipeParser, Tokenizer};
pub use variable::{RawVariable, VariableDefinition, VariableState};

/// Version of the envpipe crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
