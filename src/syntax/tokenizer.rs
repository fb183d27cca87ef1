//! Pipe-syntax lexer
//!
//! Lexical errors are collected rather than returned early: after a bad
//! lexeme the scanner resumes at the next character so that one broken
//! segment does not hide problems further along the string.

use tracing::trace;

use super::ParserOptions;
use super::token::{Token, TokenKind};
use crate::errors::{ErrorCode, ValidationError};

/// Lexer for a single pipe string
#[derive(Debug, Clone, Copy, Default)]
pub struct Tokenizer {
    options: ParserOptions,
}

impl Tokenizer {
    /// Creates a tokenizer with the given limits
    #[must_use]
    pub fn new(options: ParserOptions) -> Self {
        Self { options }
    }

    /// Lexes `input` into tokens terminated by [`TokenKind::Eof`]
    ///
    /// # Errors
    ///
    /// Returns every lexical error found in the input.
    pub fn tokenize(&self, input: &str) -> Result<Vec<Token>, Vec<ValidationError>> {
        let mut lexer = Lexer::new(input, self.options.max_json_bytes.get());
        lexer.run();
        trace!(
            tokens = lexer.tokens.len(),
            errors = lexer.errors.len(),
            "tokenized pipe string"
        );
        if lexer.errors.is_empty() {
            Ok(lexer.tokens)
        } else {
            Err(lexer.errors)
        }
    }
}

/// Scanner state. Positions are tracked both as byte offsets and line/column.
struct Lexer<'s> {
    src: &'s str,
    chars: Vec<(usize, char)>,
    pos: usize,
    line: usize,
    column: usize,
    max_json_bytes: usize,
    tokens: Vec<Token>,
    errors: Vec<ValidationError>,
}

#[derive(Clone, Copy)]
struct Mark {
    offset: usize,
    line: usize,
    column: usize,
}

impl<'s> Lexer<'s> {
    fn new(src: &'s str, max_json_bytes: usize) -> Self {
        Self {
            src,
            chars: src.char_indices().collect(),
            pos: 0,
            line: 1,
            column: 1,
            max_json_bytes,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).map(|&(_, c)| c)
    }

    fn offset(&self) -> usize {
        self.chars.get(self.pos).map_or(self.src.len(), |&(i, _)| i)
    }

    fn mark(&self) -> Mark {
        Mark {
            offset: self.offset(),
            line: self.line,
            column: self.column,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn push(&mut self, kind: TokenKind, value: String, mark: Mark) {
        self.tokens.push(Token {
            kind,
            value,
            start: mark.offset,
            end: self.offset(),
            line: mark.line,
            column: mark.column,
        });
    }

    fn error(&mut self, code: ErrorCode, message: String, mark: Mark) {
        self.errors
            .push(ValidationError::new(code, message).at(mark.line, mark.column));
    }

    fn run(&mut self) {
        while let Some(c) = self.peek() {
            let mark = self.mark();
            match c {
                c if c.is_whitespace() => {
                    self.bump();
                }
                '|' => self.punct(TokenKind::Pipe, mark),
                ':' => self.punct(TokenKind::Colon, mark),
                ',' => self.punct(TokenKind::Comma, mark),
                '.' => self.punct(TokenKind::Dot, mark),
                '"' => self.string(mark),
                '[' | '{' => self.json(mark),
                c if c.is_ascii_digit() => self.number(mark),
                '-' if self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) => self.number(mark),
                c if is_word_start(c) => self.word(mark),
                other => {
                    self.bump();
                    self.error(
                        ErrorCode::PipeParseUnexpectedCharacter,
                        format!("unexpected character '{other}'"),
                        mark,
                    );
                }
            }
        }
        let mark = self.mark();
        self.push(TokenKind::Eof, String::new(), mark);
    }

    fn punct(&mut self, kind: TokenKind, mark: Mark) {
        let c = self.bump().map(String::from).unwrap_or_default();
        self.push(kind, c, mark);
    }

    fn string(&mut self, mark: Mark) {
        self.bump();
        let mut value = String::new();
        let mut valid = true;
        loop {
            let Some(c) = self.bump() else {
                self.error(
                    ErrorCode::PipeParseUnterminatedString,
                    "unterminated string literal".to_string(),
                    mark,
                );
                return;
            };
            match c {
                '"' => break,
                '\\' => {
                    let escape_mark = Mark {
                        offset: self.offset(),
                        line: self.line,
                        column: self.column.saturating_sub(1),
                    };
                    match self.bump() {
                        Some('\\') => value.push('\\'),
                        Some('"') => value.push('"'),
                        Some(',') => value.push(','),
                        Some(':') => value.push(':'),
                        Some('.') => value.push('.'),
                        Some('|') => value.push('|'),
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some(other) => {
                            valid = false;
                            self.error(
                                ErrorCode::PipeParseInvalidEscape,
                                format!("invalid escape sequence '\\{other}'"),
                                escape_mark,
                            );
                        }
                        None => {
                            self.error(
                                ErrorCode::PipeParseUnterminatedString,
                                "unterminated string literal".to_string(),
                                mark,
                            );
                            return;
                        }
                    }
                }
                other => value.push(other),
            }
        }
        if valid {
            self.push(TokenKind::String, value, mark);
        }
    }

    fn number(&mut self, mark: Mark) {
        if self.peek() == Some('-') {
            self.bump();
        }
        self.digits();
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            self.digits();
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = usize::from(matches!(self.peek_at(1), Some('+' | '-')));
            if self.peek_at(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                for _ in 0..=sign {
                    self.bump();
                }
                self.digits();
            }
        }
        // `8080abc` is a bare word, not a number followed by garbage
        if self.peek().is_some_and(is_word_continue) {
            while self.peek().is_some_and(is_word_continue) {
                self.bump();
            }
            let text = self.src[mark.offset..self.offset()].to_string();
            self.push(TokenKind::Identifier, text, mark);
            return;
        }
        let text = self.src[mark.offset..self.offset()].to_string();
        self.push(TokenKind::Number, text, mark);
    }

    fn digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
    }

    fn word(&mut self, mark: Mark) {
        while self.peek().is_some_and(is_word_continue) {
            self.bump();
        }
        let text = &self.src[mark.offset..self.offset()];
        let kind = if text == "true" || text == "false" {
            TokenKind::Boolean
        } else {
            TokenKind::Identifier
        };
        self.push(kind, text.to_string(), mark);
    }

    /// Scans a balanced `[...]` or `{...}` blob, respecting string literals.
    fn json(&mut self, mark: Mark) {
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        let mut closed = false;
        while let Some(c) = self.bump() {
            if in_string {
                match c {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match c {
                '"' => in_string = true,
                '[' | '{' => depth += 1,
                ']' | '}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        closed = true;
                        break;
                    }
                }
                _ => {}
            }
        }

        let text = &self.src[mark.offset..self.offset()];
        if !closed {
            self.error(
                ErrorCode::PipeParseInvalidJson,
                "unterminated JSON literal".to_string(),
                mark,
            );
            return;
        }
        if text.len() > self.max_json_bytes {
            let message = format!(
                "JSON literal is {} bytes, limit is {}",
                text.len(),
                self.max_json_bytes
            );
            self.errors.push(
                ValidationError::new(ErrorCode::PipeParseJsonTooLarge, message)
                    .at(mark.line, mark.column)
                    .with_expected(format!("at most {} bytes", self.max_json_bytes))
                    .with_actual(format!("{} bytes", text.len())),
            );
            return;
        }
        if let Err(e) = serde_json::from_str::<serde_json::Value>(text) {
            self.error(
                ErrorCode::PipeParseInvalidJson,
                format!("invalid JSON literal: {e}"),
                mark,
            );
            return;
        }
        let text = text.to_string();
        self.push(TokenKind::Json, text, mark);
    }
}

fn is_word_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_word_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::num::NonZeroUsize;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Tokenizer::default()
            .tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn codes(input: &str) -> Vec<ErrorCode> {
        Tokenizer::default()
            .tokenize(input)
            .unwrap_err()
            .into_iter()
            .map(|e| e.code)
            .collect()
    }

    #[test]
    fn test_simple_pipe() {
        use TokenKind::*;
        assert_eq!(
            kinds("string|minLength:3|prompt.type:select"),
            vec![
                Identifier, Pipe, Identifier, Colon, Number, Pipe, Identifier, Dot, Identifier,
                Colon, Identifier, Eof
            ]
        );
    }

    #[test]
    fn test_literals() {
        let tokens = Tokenizer::default()
            .tokenize(r#"x|a:"hi\, there\n",b:-2.5e3,c:true,d:[1,{"k":"]"}]"#)
            .unwrap();
        let values: Vec<(TokenKind, &str)> = tokens
            .iter()
            .filter(|t| {
                matches!(
                    t.kind,
                    TokenKind::String | TokenKind::Number | TokenKind::Boolean | TokenKind::Json
                )
            })
            .map(|t| (t.kind, t.value.as_str()))
            .collect();
        assert_eq!(
            values,
            vec![
                (TokenKind::String, "hi, there\n"),
                (TokenKind::Number, "-2.5e3"),
                (TokenKind::Boolean, "true"),
                (TokenKind::Json, r#"[1,{"k":"]"}]"#),
            ]
        );
    }

    #[test]
    fn test_positions_track_lines() {
        let tokens = Tokenizer::default().tokenize("string\n|required").unwrap();
        let required = &tokens[2];
        assert_eq!(required.value, "required");
        assert_eq!((required.line, required.column), (2, 2));
        assert_eq!((required.start, required.end), (8, 16));
    }

    #[test]
    fn test_number_followed_by_letters_is_word() {
        let tokens = Tokenizer::default().tokenize("8080abc").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].value, "8080abc");
    }

    #[test]
    fn test_identifiers_are_ascii_and_may_start_with_dollar() {
        let tokens = Tokenizer::default().tokenize("$ref|_x-1:$v").unwrap();
        let words: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Identifier)
            .map(|t| t.value.as_str())
            .collect();
        assert_eq!(words, vec!["$ref", "_x-1", "$v"]);
        assert_eq!(codes("string|café:1"), vec![ErrorCode::PipeParseUnexpectedCharacter]);
    }

    #[test]
    fn test_unterminated_string() {
        assert_eq!(codes(r#"string|default:"oops"#), vec![ErrorCode::PipeParseUnterminatedString]);
    }

    #[test]
    fn test_recovers_after_bad_escape_and_reports_later_errors() {
        let errors = Tokenizer::default()
            .tokenize(r#"string|a:"bad\q"|b:#|c:[1,"#)
            .unwrap_err();
        let codes: Vec<_> = errors.iter().map(|e| e.code).collect();
        assert_eq!(
            codes,
            vec![
                ErrorCode::PipeParseInvalidEscape,
                ErrorCode::PipeParseUnexpectedCharacter,
                ErrorCode::PipeParseInvalidJson,
            ]
        );
        let source = errors[1].source.as_ref().unwrap();
        assert_eq!(source.column, Some(20));
    }

    #[test]
    fn test_json_size_limit() {
        let options = ParserOptions::default().with_max_json_bytes(NonZeroUsize::new(8).unwrap());
        let errors = Tokenizer::new(options)
            .tokenize(r#"x|values:["aaaa","bbbb"]"#)
            .unwrap_err();
        assert_eq!(errors[0].code, ErrorCode::PipeParseJsonTooLarge);
    }

    #[test]
    fn test_invalid_json_rejected() {
        assert_eq!(codes("x|values:{a:1}"), vec![ErrorCode::PipeParseInvalidJson]);
    }

    #[test]
    fn test_empty_input_is_only_eof() {
        assert_eq!(kinds("   "), vec![TokenKind::Eof]);
    }
}
