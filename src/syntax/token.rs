//! Lexical tokens of the pipe syntax

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a lexical token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
    /// `|`
    Pipe,
    /// `:`
    Colon,
    /// `,`
    Comma,
    /// `.`
    Dot,
    /// Bare word
    Identifier,
    /// Double-quoted string, escapes decoded
    String,
    /// Integer or decimal number
    Number,
    /// `true` or `false`
    Boolean,
    /// Bracketed or braced JSON blob
    Json,
    /// End of input
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Pipe => "'|'",
            Self::Colon => "':'",
            Self::Comma => "','",
            Self::Dot => "'.'",
            Self::Identifier => "identifier",
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Json => "JSON literal",
            Self::Eof => "end of input",
        };
        f.write_str(text)
    }
}

/// A token with its position in the pipe string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Token kind
    pub kind: TokenKind,
    /// Decoded text (string contents without quotes, raw text otherwise)
    pub value: String,
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
    /// 1-based line
    pub line: usize,
    /// 1-based column
    pub column: usize,
}

impl Token {
    /// Returns true if the token is of the given kind
    #[must_use]
    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}
