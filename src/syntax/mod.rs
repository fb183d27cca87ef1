//! Pipe-syntax front end
//!
//! A pipe string such as `string|minLength:3|prompt.type:select` is lexed by
//! the [`Tokenizer`], parsed into a short-lived AST by the [`PipeParser`] and
//! folded into a [`PipeConfig`].

pub mod ast;
mod parser;
mod token;
mod tokenizer;

pub use parser::{PipeConfig, PipeParser, TransformStep};
pub use token::{Token, TokenKind};
pub use tokenizer::Tokenizer;

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

/// Property names that are rejected in every path and JSON object key
pub const RESERVED_NAMES: [&str; 3] = ["__proto__", "constructor", "prototype"];

/// Returns true for a reserved property name
#[must_use]
pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// Limits enforced while lexing and parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    /// Maximum number of segments in a dotted path (default 5)
    pub max_depth: NonZeroUsize,
    /// Maximum characters in one path segment (default 50)
    pub max_segment_length: NonZeroUsize,
    /// Maximum bytes of one JSON literal (default 10 KiB)
    pub max_json_bytes: NonZeroUsize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            max_depth: NonZeroUsize::new(5).unwrap_or(NonZeroUsize::MIN),
            max_segment_length: NonZeroUsize::new(50).unwrap_or(NonZeroUsize::MIN),
            max_json_bytes: NonZeroUsize::new(10 * 1024).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl ParserOptions {
    /// Sets the maximum path depth
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: NonZeroUsize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Sets the maximum segment length
    #[must_use]
    pub fn with_max_segment_length(mut self, max: NonZeroUsize) -> Self {
        self.max_segment_length = max;
        self
    }

    /// Sets the maximum JSON literal size in bytes
    #[must_use]
    pub fn with_max_json_bytes(mut self, max: NonZeroUsize) -> Self {
        self.max_json_bytes = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let options = ParserOptions::default();
        assert_eq!(options.max_depth.get(), 5);
        assert_eq!(options.max_segment_length.get(), 50);
        assert_eq!(options.max_json_bytes.get(), 10240);
    }

    #[test]
    fn test_reserved_names() {
        assert!(is_reserved("__proto__"));
        assert!(is_reserved("constructor"));
        assert!(is_reserved("prototype"));
        assert!(!is_reserved("proto"));
    }

    #[test]
    fn test_options_deserialize_partial() {
        let options: ParserOptions = serde_yaml::from_str("max_depth: 3").unwrap();
        assert_eq!(options.max_depth.get(), 3);
        assert_eq!(options.max_segment_length.get(), 50);
    }
}
