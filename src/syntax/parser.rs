//! Recursive-descent pipe parser
//!
//! ```text
//! pipe    := TYPE ('|' section)*
//! section := path (':' value (',' path ':' value)*)?
//! path    := IDENT ('.' IDENT)*
//! value   := STRING | NUMBER | BOOLEAN | JSON | IDENT
//! ```
//!
//! Syntax errors are collected per section: after an error the parser skips
//! to the next `|` and keeps going. A pipe string with any error produces no
//! [`PipeConfig`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::debug;

use super::ast::{Literal, LiteralValue, Node, Parameter, Position, PropertyAccess, Section, walk};
use super::token::{Token, TokenKind};
use super::tokenizer::Tokenizer;
use super::{ParserOptions, is_reserved};
use crate::errors::{ErrorCode, ValidationError};

/// Section key that marks a variable as required
const REQUIRED_KEY: &str = "required";
/// Section key that declares a default value
const DEFAULT_KEY: &str = "default";
/// Section key that starts a transform step
const TRANSFORM_KEY: &str = "transform";

/// One transformer invocation declared in a pipe string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformStep {
    /// Transformer name
    pub name: String,
    /// Parameters given after the name
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// Structured result of parsing one pipe string
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipeConfig {
    /// Variable type, used to look up the validator
    #[serde(rename = "type")]
    pub type_name: String,
    /// Parameters nested by dotted path
    pub params: Map<String, Value>,
    /// Whether a value must be supplied
    #[serde(default)]
    pub required: bool,
    /// Default value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Transform steps in declaration order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<TransformStep>,
}

/// Parser turning pipe strings into [`PipeConfig`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct PipeParser {
    options: ParserOptions,
}

impl PipeParser {
    /// Creates a parser with the given limits
    #[must_use]
    pub fn new(options: ParserOptions) -> Self {
        Self { options }
    }

    /// Limits in effect
    #[must_use]
    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// Parses a pipe string
    ///
    /// `source_line` is the template line the pipe string sits on; reported
    /// lines are shifted by it.
    ///
    /// # Errors
    ///
    /// Returns every lexical, syntactic and limit error found.
    pub fn parse(
        &self,
        input: &str,
        source_line: Option<usize>,
    ) -> Result<PipeConfig, Vec<ValidationError>> {
        let shift = |mut errors: Vec<ValidationError>| {
            if let Some(base) = source_line {
                for error in &mut errors {
                    if let Some(line) = error.source.as_mut().and_then(|s| s.line.as_mut()) {
                        *line += base.saturating_sub(1);
                    }
                }
            }
            errors
        };

        let tokens = Tokenizer::new(self.options).tokenize(input).map_err(shift)?;
        let sections = SectionParser::new(&tokens).parse().map_err(shift)?;

        let mut errors = self.check_limits(&sections);
        let folded = fold(&sections);
        match folded {
            Ok(config) if errors.is_empty() => {
                debug!(type_name = %config.type_name, "parsed pipe string");
                Ok(config)
            }
            Ok(_) => Err(shift(errors)),
            Err(fold_errors) => {
                errors.extend(fold_errors);
                Err(shift(errors))
            }
        }
    }

    /// Enforces depth, segment length, reserved names and JSON size
    fn check_limits(&self, sections: &[Section]) -> Vec<ValidationError> {
        let max_depth = self.options.max_depth.get();
        let max_segment = self.options.max_segment_length.get();
        let max_json = self.options.max_json_bytes.get();
        let mut errors = Vec::new();

        for section in sections {
            walk(Node::Section(section), |node| match node {
                Node::Section(s) => {
                    if is_reserved(&s.type_name) && s.parameters.is_empty() {
                        errors.push(reserved_error(&s.type_name, s.position));
                    }
                }
                Node::Parameter(_) => {}
                Node::PropertyAccess(access) => {
                    let at = access.position;
                    if access.path.len() > max_depth {
                        errors.push(
                            ValidationError::new(
                                ErrorCode::PipeParseMaxDepthExceeded,
                                format!(
                                    "path '{}' is nested {} levels deep, limit is {max_depth}",
                                    access.dotted(),
                                    access.path.len()
                                ),
                            )
                            .at(at.line, at.column)
                            .with_expected(format!("at most {max_depth} segments"))
                            .with_actual(access.path.len().to_string()),
                        );
                    }
                    for segment in &access.path {
                        if segment.chars().count() > max_segment {
                            errors.push(
                                ValidationError::new(
                                    ErrorCode::PipeParseSegmentTooLong,
                                    format!(
                                        "path segment '{segment}' exceeds {max_segment} characters"
                                    ),
                                )
                                .at(at.line, at.column),
                            );
                        }
                        if is_reserved(segment) {
                            errors.push(reserved_error(segment, at));
                        }
                    }
                }
                Node::Literal(literal) => {
                    if let LiteralValue::Json(value) = &literal.value {
                        let at = literal.position;
                        let size = value.to_string().len();
                        if size > max_json {
                            errors.push(
                                ValidationError::new(
                                    ErrorCode::PipeParseJsonTooLarge,
                                    format!("JSON literal is {size} bytes, limit is {max_json}"),
                                )
                                .at(at.line, at.column),
                            );
                        }
                        if let Some(key) = reserved_json_key(value) {
                            errors.push(reserved_error(&key, at));
                        }
                    }
                }
            });
        }
        errors
    }
}

fn reserved_error(name: &str, at: Position) -> ValidationError {
    ValidationError::new(
        ErrorCode::PipeParseReservedName,
        format!("'{name}' is a reserved property name"),
    )
    .at(at.line, at.column)
    .with_suggestion("rename the property")
}

/// Finds a reserved key anywhere inside a JSON value, iteratively
fn reserved_json_key(value: &Value) -> Option<String> {
    let mut stack = vec![value];
    while let Some(current) = stack.pop() {
        match current {
            Value::Object(map) => {
                if let Some(key) = map.keys().find(|k| is_reserved(k)) {
                    return Some(key.clone());
                }
                stack.extend(map.values());
            }
            Value::Array(items) => stack.extend(items),
            _ => {}
        }
    }
    None
}

/// Token-level recursive descent
struct SectionParser<'t> {
    tokens: &'t [Token],
    pos: usize,
    errors: Vec<ValidationError>,
}

impl<'t> SectionParser<'t> {
    fn new(tokens: &'t [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
        }
    }

    fn peek(&self) -> &'t Token {
        // tokenizer output always ends with Eof
        let tokens: &'t [Token] = self.tokens;
        &tokens[self.pos.min(tokens.len().saturating_sub(1))]
    }

    fn advance(&mut self) -> &'t Token {
        let token = self.peek();
        if !token.is(TokenKind::Eof) {
            self.pos += 1;
        }
        token
    }

    /// Consumes the next token if it has the expected kind
    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<&'t Token, ValidationError> {
        let token = self.peek();
        if token.is(kind) {
            Ok(self.advance())
        } else {
            Err(Self::unexpected(token, expected))
        }
    }

    fn unexpected(token: &Token, expected: &str) -> ValidationError {
        let found = if token.is(TokenKind::Eof) {
            token.kind.to_string()
        } else {
            format!("{} '{}'", token.kind, token.value)
        };
        ValidationError::new(
            ErrorCode::PipeParseUnexpectedToken,
            format!("expected {expected}, found {found}"),
        )
        .at(token.line, token.column)
        .with_expected(expected.to_string())
        .with_actual(found)
    }

    fn parse(mut self) -> Result<Vec<Section>, Vec<ValidationError>> {
        if self.tokens.is_empty() || self.peek().is(TokenKind::Eof) {
            return Err(vec![ValidationError::new(
                ErrorCode::PipeParseEmptyInput,
                "pipe string is empty",
            )
            .with_suggestion("start the pipe string with a type, e.g. 'string'")]);
        }

        let mut sections = Vec::new();
        match self.type_section() {
            Ok(section) => sections.push(section),
            Err(error) => {
                self.errors.push(error);
                self.synchronize();
            }
        }

        while !self.peek().is(TokenKind::Eof) {
            if !self.peek().is(TokenKind::Pipe) {
                let error = Self::unexpected(self.peek(), "'|'");
                self.errors.push(error);
                self.synchronize();
                continue;
            }
            self.advance();
            match self.section() {
                Ok(section) => sections.push(section),
                Err(error) => {
                    self.errors.push(error);
                    self.synchronize();
                }
            }
        }

        if self.errors.is_empty() {
            Ok(sections)
        } else {
            Err(self.errors)
        }
    }

    /// Skips to the next `|` (or end of input)
    fn synchronize(&mut self) {
        while !matches!(self.peek().kind, TokenKind::Pipe | TokenKind::Eof) {
            self.advance();
        }
    }

    fn type_section(&mut self) -> Result<Section, ValidationError> {
        let token = self.expect(TokenKind::Identifier, "a type name")?;
        let section = Section {
            type_name: token.value.clone(),
            parameters: Vec::new(),
            position: Position {
                line: token.line,
                column: token.column,
            },
        };
        let next = self.peek();
        if !matches!(next.kind, TokenKind::Pipe | TokenKind::Eof) {
            return Err(Self::unexpected(next, "'|' after the type name"));
        }
        Ok(section)
    }

    fn section(&mut self) -> Result<Section, ValidationError> {
        let start = self.peek();
        let position = Position {
            line: start.line,
            column: start.column,
        };
        let key = self.path()?;
        let mut parameters = Vec::new();

        if self.peek().is(TokenKind::Colon) {
            self.advance();
            let value = self.value()?;
            parameters.push(Parameter { key, value });
            while self.peek().is(TokenKind::Comma) {
                self.advance();
                let key = self.path()?;
                self.expect(TokenKind::Colon, "':'")?;
                let value = self.value()?;
                parameters.push(Parameter { key, value });
            }
        } else {
            // bare flag
            let value = Literal {
                value: LiteralValue::Boolean(true),
                text: "true".to_string(),
                position: key.position,
            };
            parameters.push(Parameter { key, value });
        }

        let next = self.peek();
        if !matches!(next.kind, TokenKind::Pipe | TokenKind::Eof) {
            return Err(Self::unexpected(next, "',' or '|'"));
        }

        Ok(Section {
            type_name: parameters[0].key.dotted(),
            parameters,
            position,
        })
    }

    fn path(&mut self) -> Result<PropertyAccess, ValidationError> {
        let first = self.expect(TokenKind::Identifier, "a parameter name")?;
        let mut path = vec![first.value.clone()];
        while self.peek().is(TokenKind::Dot) {
            self.advance();
            let segment = self.expect(TokenKind::Identifier, "a path segment after '.'")?;
            path.push(segment.value.clone());
        }
        Ok(PropertyAccess {
            path,
            position: Position {
                line: first.line,
                column: first.column,
            },
        })
    }

    fn value(&mut self) -> Result<Literal, ValidationError> {
        let token = self.peek();
        if matches!(token.kind, TokenKind::Pipe | TokenKind::Eof) {
            return Err(Self::unexpected(token, "a value"));
        }
        self.advance();
        let position = Position {
            line: token.line,
            column: token.column,
        };
        let value = match token.kind {
            TokenKind::String | TokenKind::Identifier => LiteralValue::String(token.value.clone()),
            TokenKind::Boolean => LiteralValue::Boolean(token.value == "true"),
            TokenKind::Number => LiteralValue::Number(parse_number(token)?),
            TokenKind::Json => {
                let value = serde_json::from_str(&token.value).map_err(|e| {
                    ValidationError::new(
                        ErrorCode::PipeParseInvalidJson,
                        format!("invalid JSON literal: {e}"),
                    )
                    .at(token.line, token.column)
                })?;
                LiteralValue::Json(value)
            }
            _ => return Err(Self::unexpected(token, "a value")),
        };
        Ok(Literal {
            value,
            text: token.value.clone(),
            position,
        })
    }
}

fn parse_number(token: &Token) -> Result<Number, ValidationError> {
    if let Ok(int) = token.value.parse::<i64>() {
        return Ok(Number::from(int));
    }
    token
        .value
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| {
            ValidationError::new(
                ErrorCode::PipeParseUnexpectedToken,
                format!("'{}' is not a representable number", token.value),
            )
            .at(token.line, token.column)
        })
}

/// Folds parsed sections into a [`PipeConfig`]
fn fold(sections: &[Section]) -> Result<PipeConfig, Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut config = PipeConfig::default();
    let Some((head, rest)) = sections.split_first() else {
        return Err(vec![ValidationError::new(
            ErrorCode::PipeParseEmptyInput,
            "pipe string is empty",
        )]);
    };
    config.type_name = head.type_name.clone();

    for section in rest {
        let mut parameters = section.parameters.iter();
        let Some(first) = parameters.next() else {
            continue;
        };

        if first.key.is(TRANSFORM_KEY) {
            let Some(name) = first.value.value.as_str() else {
                errors.push(
                    ValidationError::new(
                        ErrorCode::PipeParseUnexpectedToken,
                        "transform expects a transformer name",
                    )
                    .at(first.value.position.line, first.value.position.column),
                );
                continue;
            };
            let mut step = TransformStep {
                name: name.to_string(),
                params: Map::new(),
            };
            for param in parameters {
                if let Err(e) = insert_param(&mut step.params, param) {
                    errors.push(e);
                }
            }
            config.transforms.push(step);
            continue;
        }

        for param in section.parameters.iter() {
            if param.key.is(REQUIRED_KEY) {
                match param.value.value {
                    LiteralValue::Boolean(flag) => config.required = flag,
                    _ => errors.push(
                        ValidationError::new(
                            ErrorCode::PipeParseUnexpectedToken,
                            "required expects a boolean",
                        )
                        .at(param.value.position.line, param.value.position.column)
                        .with_expected("true or false"),
                    ),
                }
            } else if param.key.is(DEFAULT_KEY) {
                if config.default.is_some() {
                    errors.push(duplicate_error(&param.key));
                } else {
                    config.default = Some(param.value.to_default_string());
                }
            } else if let Err(e) = insert_param(&mut config.params, param) {
                errors.push(e);
            }
        }
    }

    if errors.is_empty() {
        Ok(config)
    } else {
        Err(errors)
    }
}

fn duplicate_error(key: &PropertyAccess) -> ValidationError {
    ValidationError::new(
        ErrorCode::PipeParseDuplicateKey,
        format!("parameter '{}' is declared more than once", key.dotted()),
    )
    .at(key.position.line, key.position.column)
}

/// Inserts `param` into `map` following its dotted path
fn insert_param(map: &mut Map<String, Value>, param: &Parameter) -> Result<(), ValidationError> {
    let Some((last, parents)) = param.key.path.split_last() else {
        return Ok(());
    };
    let mut current = map;
    for segment in parents {
        current = match current
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()))
        {
            Value::Object(inner) => inner,
            _ => return Err(duplicate_error(&param.key)),
        };
    }
    if current.contains_key(last) {
        return Err(duplicate_error(&param.key));
    }
    current.insert(last.clone(), param.value.value.to_json());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn parse(input: &str) -> PipeConfig {
        PipeParser::default().parse(input, None).unwrap()
    }

    fn parse_codes(input: &str) -> Vec<ErrorCode> {
        PipeParser::default()
            .parse(input, None)
            .unwrap_err()
            .into_iter()
            .map(|e| e.code)
            .collect()
    }

    #[test]
    fn test_min_max_length() {
        let config = parse("string|minLength:3|maxLength:10");
        assert_eq!(config.type_name, "string");
        assert_eq!(
            Value::Object(config.params),
            json!({"minLength": 3, "maxLength": 10})
        );
        assert!(!config.required);
        assert_eq!(config.default, None);
    }

    #[test]
    fn test_nested_prompt() {
        let config = parse(r#"number|prompt.type:select|prompt.label:"Pick one""#);
        assert_eq!(config.type_name, "number");
        assert_eq!(
            Value::Object(config.params),
            json!({"prompt": {"type": "select", "label": "Pick one"}})
        );
    }

    #[test]
    fn test_required_default_and_transforms() {
        let config = parse(
            r#"string|required|transform:truncate,maxLength:5|transform:uppercase|description:"API host""#,
        );
        assert!(config.required);
        assert_eq!(config.transforms.len(), 2);
        assert_eq!(config.transforms[0].name, "truncate");
        assert_eq!(Value::Object(config.transforms[0].params.clone()), json!({"maxLength": 5}));
        assert_eq!(config.transforms[1].name, "uppercase");
        assert_eq!(config.params["description"], json!("API host"));

        let config = parse(r#"url|default:"http://localhost:8080""#);
        assert_eq!(config.default.as_deref(), Some("http://localhost:8080"));
        assert!(!config.required);
    }

    #[rstest]
    #[case("007")]
    #[case("1.50")]
    #[case("1e3")]
    #[case("-0")]
    #[case("0644")]
    fn test_number_default_keeps_written_form(#[case] written: &str) {
        let config = parse(&format!("string|default:{written}"));
        assert_eq!(config.default.as_deref(), Some(written));
    }

    #[test]
    fn test_comma_continuation_and_json() {
        let config = parse(r#"enum|values:["dev","prod"],caseSensitive:false|default:dev"#);
        assert_eq!(config.params["values"], json!(["dev", "prod"]));
        assert_eq!(config.params["caseSensitive"], json!(false));
        assert_eq!(config.default.as_deref(), Some("dev"));
    }

    #[test]
    fn test_max_depth_exceeded() {
        let result = PipeParser::default().parse("string|a.b.c.d.e.f:1", None);
        let errors = result.unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::PipeParseMaxDepthExceeded);
    }

    #[test]
    fn test_depth_at_limit_is_accepted() {
        let config = parse("string|a.b.c.d.e:1");
        assert_eq!(config.params["a"]["b"]["c"]["d"]["e"], json!(1));
    }

    #[rstest]
    #[case("string|__proto__.x:1")]
    #[case("string|prompt.constructor:1")]
    #[case("string|prototype")]
    #[case(r#"string|options:{"__proto__":1}"#)]
    #[case("constructor")]
    fn test_reserved_names_rejected(#[case] input: &str) {
        assert!(parse_codes(input).contains(&ErrorCode::PipeParseReservedName));
    }

    #[test]
    fn test_segment_too_long() {
        let input = format!("string|{}:1", "x".repeat(51));
        assert_eq!(parse_codes(&input), vec![ErrorCode::PipeParseSegmentTooLong]);
    }

    #[rstest]
    #[case("string|minLength:3|minLength:4")]
    #[case("string|prompt:1|prompt.type:select")]
    #[case("string|default:a|default:b")]
    fn test_duplicate_keys(#[case] input: &str) {
        assert_eq!(parse_codes(input), vec![ErrorCode::PipeParseDuplicateKey]);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(parse_codes("  "), vec![ErrorCode::PipeParseEmptyInput]);
    }

    #[test]
    fn test_collects_errors_from_several_sections() {
        let errors = PipeParser::default()
            .parse("string|:3|minLength:|maxLength:10", Some(7))
            .unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.code == ErrorCode::PipeParseUnexpectedToken));
        let first = errors[0].source.as_ref().unwrap();
        assert_eq!((first.line, first.column), (Some(7), Some(8)));
    }

    #[test]
    fn test_lexical_errors_are_reported_with_shifted_line() {
        let errors = PipeParser::default()
            .parse(r#"string|default:"open"#, Some(3))
            .unwrap_err();
        assert_eq!(errors[0].code, ErrorCode::PipeParseUnterminatedString);
        assert_eq!(errors[0].source.as_ref().unwrap().line, Some(3));
    }

    #[test]
    fn test_transform_requires_name() {
        assert_eq!(
            parse_codes("string|transform:5"),
            vec![ErrorCode::PipeParseUnexpectedToken]
        );
    }

    #[test]
    fn test_type_must_come_first() {
        assert_eq!(parse_codes("|required"), vec![ErrorCode::PipeParseUnexpectedToken]);
    }
}
