//! Built-in transformers

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};

use super::{ParamError, as_count, as_flag, as_text, param};
use crate::errors::{ErrorCode, ValidationError};
use crate::macros::builtin_plugin;
use crate::plugins::traits::{Params, PluginMetadata, Transformer, VariableContext};

fn invalid<T>(read: Result<T, ParamError>) -> Result<T, ValidationError> {
    read.map_err(ParamError::into_transform_error)
}

fn missing(transform: &str, key: &str) -> ValidationError {
    ValidationError::new(
        ErrorCode::TransformMissingParameter,
        format!("transform '{transform}' requires parameter '{key}'"),
    )
    .with_suggestion(format!("add {key}:<value> after transform:{transform}"))
}

builtin_plugin!(
    /// Keeps the first `maxLength` characters
    TruncateTransformer,
    "truncate",
    "Shortens text to a maximum length"
);

#[async_trait]
impl Transformer for TruncateTransformer {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn transform(
        &self,
        value: &str,
        params: &Params,
        _context: &VariableContext<'_>,
    ) -> Result<String, ValidationError> {
        let max = invalid(param(params, "maxLength", "a non-negative integer", as_count))?
            .ok_or_else(|| missing(&self.metadata.name, "maxLength"))?;
        Ok(value.chars().take(max).collect())
    }
}

builtin_plugin!(
    /// Upper-cases text
    UppercaseTransformer,
    "uppercase",
    "Converts text to upper case"
);

#[async_trait]
impl Transformer for UppercaseTransformer {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn transform(
        &self,
        value: &str,
        _params: &Params,
        _context: &VariableContext<'_>,
    ) -> Result<String, ValidationError> {
        Ok(value.to_uppercase())
    }
}

builtin_plugin!(
    /// Lower-cases text
    LowercaseTransformer,
    "lowercase",
    "Converts text to lower case"
);

#[async_trait]
impl Transformer for LowercaseTransformer {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn transform(
        &self,
        value: &str,
        _params: &Params,
        _context: &VariableContext<'_>,
    ) -> Result<String, ValidationError> {
        Ok(value.to_lowercase())
    }
}

builtin_plugin!(
    /// Strips leading and trailing whitespace
    TrimTransformer,
    "trim",
    "Strips surrounding whitespace"
);

#[async_trait]
impl Transformer for TrimTransformer {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn transform(
        &self,
        value: &str,
        _params: &Params,
        _context: &VariableContext<'_>,
    ) -> Result<String, ValidationError> {
        Ok(value.trim().to_string())
    }
}

builtin_plugin!(
    /// Replaces occurrences of `from` with `to` (empty by default); `all:false`
    /// replaces only the first one
    ReplaceTransformer,
    "replace",
    "Replaces substrings"
);

#[async_trait]
impl Transformer for ReplaceTransformer {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn transform(
        &self,
        value: &str,
        params: &Params,
        _context: &VariableContext<'_>,
    ) -> Result<String, ValidationError> {
        let from = invalid(param(params, "from", "a string", as_text))?
            .ok_or_else(|| missing(&self.metadata.name, "from"))?;
        if from.is_empty() {
            return Err(ValidationError::new(
                ErrorCode::TransformInvalidParameter,
                "parameter 'from' must not be empty",
            ));
        }
        let to = invalid(param(params, "to", "a string", as_text))?.unwrap_or_default();
        let all = invalid(param(params, "all", "a boolean", as_flag))?.unwrap_or(true);
        Ok(if all {
            value.replace(&from, &to)
        } else {
            value.replacen(&from, &to, 1)
        })
    }
}

builtin_plugin!(
    /// Base64 encoding; `urlSafe:true` selects the URL-safe alphabet and
    /// `decode:true` reverses the encoding
    Base64Transformer,
    "base64",
    "Base64 encoding and decoding"
);

#[async_trait]
impl Transformer for Base64Transformer {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn transform(
        &self,
        value: &str,
        params: &Params,
        _context: &VariableContext<'_>,
    ) -> Result<String, ValidationError> {
        let url_safe = invalid(param(params, "urlSafe", "a boolean", as_flag))?.unwrap_or(false);
        let decode = invalid(param(params, "decode", "a boolean", as_flag))?.unwrap_or(false);
        let engine = if url_safe { &URL_SAFE } else { &STANDARD };

        if !decode {
            return Ok(engine.encode(value));
        }
        let bytes = engine.decode(value).map_err(|e| {
            ValidationError::new(
                ErrorCode::TransformExecutionError,
                format!("value is not valid base64: {e}"),
            )
        })?;
        String::from_utf8(bytes).map_err(|_| {
            ValidationError::new(
                ErrorCode::TransformExecutionError,
                "decoded value is not valid UTF-8",
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use std::collections::HashMap;

    async fn apply(transformer: &dyn Transformer, value: &str, p: Value) -> Result<String, ValidationError> {
        let params = match p {
            Value::Object(map) => map,
            _ => Params::new(),
        };
        let resolved = HashMap::new();
        let context = VariableContext::new(&resolved, "TEST");
        transformer.transform(value, &params, &context).await
    }

    #[tokio::test]
    async fn test_truncate() {
        let t = TruncateTransformer::new();
        assert_eq!(apply(&t, "hello world", json!({"maxLength": 5})).await.unwrap(), "hello");
        assert_eq!(apply(&t, "héllo", json!({"maxLength": 2})).await.unwrap(), "hé");
        assert_eq!(apply(&t, "hi", json!({"maxLength": 5})).await.unwrap(), "hi");

        let err = apply(&t, "hi", json!({})).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::TransformMissingParameter);
        let err = apply(&t, "hi", json!({"maxLength": "five"})).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::TransformInvalidParameter);
    }

    #[tokio::test]
    async fn test_case_and_trim() {
        assert_eq!(apply(&UppercaseTransformer::new(), "Abc", json!({})).await.unwrap(), "ABC");
        assert_eq!(apply(&LowercaseTransformer::new(), "AbC", json!({})).await.unwrap(), "abc");
        assert_eq!(apply(&TrimTransformer::new(), "  x \n", json!({})).await.unwrap(), "x");
    }

    #[tokio::test]
    async fn test_replace() {
        let t = ReplaceTransformer::new();
        assert_eq!(
            apply(&t, "a-b-c", json!({"from": "-", "to": "_"})).await.unwrap(),
            "a_b_c"
        );
        assert_eq!(
            apply(&t, "a-b-c", json!({"from": "-", "all": false})).await.unwrap(),
            "ab-c"
        );
        let err = apply(&t, "a", json!({"to": "b"})).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::TransformMissingParameter);
    }

    #[tokio::test]
    async fn test_base64() {
        let t = Base64Transformer::new();
        assert_eq!(apply(&t, "user:pass", json!({})).await.unwrap(), "dXNlcjpwYXNz");
        assert_eq!(
            apply(&t, "dXNlcjpwYXNz", json!({"decode": true})).await.unwrap(),
            "user:pass"
        );
        assert_eq!(apply(&t, "??>", json!({"urlSafe": true})).await.unwrap(), "Pz8-");
        let err = apply(&t, "%%%", json!({"decode": true})).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::TransformExecutionError);
    }
}
