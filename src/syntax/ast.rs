//! Pipe-syntax AST
//!
//! Built once per pipe string, folded into a `PipeConfig`, then dropped.

use serde_json::{Number, Value};

/// Position of a node in the pipe string
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    /// 1-based line
    pub line: usize,
    /// 1-based column
    pub column: usize,
}

/// Dotted property path, e.g. `prompt.type`
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyAccess {
    /// Path segments
    pub path: Vec<String>,
    /// Position of the first segment
    pub position: Position,
}

impl PropertyAccess {
    /// Path joined with dots
    #[must_use]
    pub fn dotted(&self) -> String {
        self.path.join(".")
    }

    /// Returns true for a single-segment path equal to `name`
    #[must_use]
    pub fn is(&self, name: &str) -> bool {
        self.path.len() == 1 && self.path[0] == name
    }
}

/// Literal payload
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    /// Quoted string or bare word
    String(String),
    /// Number
    Number(Number),
    /// Boolean
    Boolean(bool),
    /// JSON array or object
    Json(Value),
}

impl LiteralValue {
    /// JSON form of the literal
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Number(n) => Value::Number(n.clone()),
            Self::Boolean(b) => Value::Bool(*b),
            Self::Json(v) => v.clone(),
        }
    }

    /// Plain text form: strings unquoted, everything else as compact JSON
    #[must_use]
    pub fn to_plain_string(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Number(n) => n.to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::Json(v) => v.to_string(),
        }
    }

    /// String content, for literals that are strings
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Literal value with its position
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    /// Payload
    pub value: LiteralValue,
    /// Lexeme as written in the pipe string
    pub text: String,
    /// Position of the literal
    pub position: Position,
}

impl Literal {
    /// Text used for a `default`: numbers keep their written form, so `007`
    /// stays `007`
    #[must_use]
    pub fn to_default_string(&self) -> String {
        match self.value {
            LiteralValue::Number(_) => self.text.clone(),
            _ => self.value.to_plain_string(),
        }
    }
}

/// `key:value` pair (a bare `key` parses as `key:true`)
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Parameter path
    pub key: PropertyAccess,
    /// Parameter value
    pub value: Literal,
}

/// One `|`-separated section
///
/// The leading section carries the variable type and no parameters; every
/// following section is named after its first parameter's path.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    /// Variable type for the leading section, first key otherwise
    pub type_name: String,
    /// Parameters in declaration order
    pub parameters: Vec<Parameter>,
    /// Position of the section start
    pub position: Position,
}

/// Borrowed view over any AST node
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    /// Dotted path
    PropertyAccess(&'a PropertyAccess),
    /// Literal value
    Literal(&'a Literal),
    /// Key/value pair
    Parameter(&'a Parameter),
    /// Pipe section
    Section(&'a Section),
}

impl<'a> Node<'a> {
    /// Position of the node
    #[must_use]
    pub fn position(&self) -> Position {
        match self {
            Node::PropertyAccess(p) => p.position,
            Node::Literal(l) => l.position,
            Node::Parameter(p) => p.key.position,
            Node::Section(s) => s.position,
        }
    }

    /// Direct children, in source order
    #[must_use]
    pub fn children(&self) -> Vec<Node<'a>> {
        match self {
            Node::PropertyAccess(_) | Node::Literal(_) => Vec::new(),
            Node::Parameter(p) => vec![Node::PropertyAccess(&p.key), Node::Literal(&p.value)],
            Node::Section(s) => s.parameters.iter().map(Node::Parameter).collect(),
        }
    }
}

/// Visits `root` and its descendants depth-first, pre-order, without recursion
pub fn walk<'a>(root: Node<'a>, mut visit: impl FnMut(Node<'a>)) {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        visit(node);
        stack.extend(node.children().into_iter().rev());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(path: &[&str], value: LiteralValue) -> Parameter {
        Parameter {
            key: PropertyAccess {
                path: path.iter().map(ToString::to_string).collect(),
                position: Position::default(),
            },
            value: Literal {
                text: value.to_plain_string(),
                value,
                position: Position::default(),
            },
        }
    }

    #[test]
    fn test_walk_order() {
        let section = Section {
            type_name: "prompt.type".to_string(),
            parameters: vec![
                param(&["prompt", "type"], LiteralValue::String("select".into())),
                param(&["required"], LiteralValue::Boolean(true)),
            ],
            position: Position::default(),
        };
        let mut seen = Vec::new();
        walk(Node::Section(&section), |node| {
            seen.push(match node {
                Node::Section(_) => "section".to_string(),
                Node::Parameter(_) => "param".to_string(),
                Node::PropertyAccess(p) => p.dotted(),
                Node::Literal(l) => l.value.to_plain_string(),
            });
        });
        assert_eq!(
            seen,
            vec!["section", "param", "prompt.type", "select", "param", "required", "true"]
        );
    }

    #[test]
    fn test_literal_plain_string() {
        assert_eq!(LiteralValue::Number(Number::from(3)).to_plain_string(), "3");
        assert_eq!(
            LiteralValue::Json(serde_json::json!(["a", 1])).to_plain_string(),
            r#"["a",1]"#
        );
    }
}
