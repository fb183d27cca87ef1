//! Plugins shipped with the crate
//!
//! Every built-in is registered explicitly by
//! [`PluginRegistry::with_builtins`](super::PluginRegistry::with_builtins) and
//! is also a catalog entry, so a manifest can expose one under another name.

mod transformers;
mod validators;

pub use transformers::{
    Base64Transformer, LowercaseTransformer, ReplaceTransformer, TrimTransformer,
    TruncateTransformer, UppercaseTransformer,
};
pub use validators::{
    BooleanValidator, EmailValidator, EnumValidator, JsonValidator, NumberValidator,
    PortValidator, StringValidator, UrlValidator,
};

use serde_json::Value;
use std::sync::Arc;

use super::discovery::{LoadedPlugin, PluginFactory};
use super::registry::PluginRegistry;
use super::traits::{Params, PluginMetadata, Transformer, Validator};
use crate::errors::{ErrorCode, PluginError, ValidationError};

fn validator<V: Validator + 'static>(make: fn(PluginMetadata) -> V) -> PluginFactory {
    Arc::new(move |metadata| LoadedPlugin::Validator(Box::new(make(metadata))))
}

fn transformer<T: Transformer + 'static>(make: fn(PluginMetadata) -> T) -> PluginFactory {
    Arc::new(move |metadata| LoadedPlugin::Transformer(Box::new(make(metadata))))
}

/// Name, description and factory of every built-in
fn builtins() -> Vec<(&'static str, &'static str, PluginFactory)> {
    vec![
        (StringValidator::NAME, StringValidator::DESCRIPTION, validator(StringValidator::with_metadata)),
        (NumberValidator::NAME, NumberValidator::DESCRIPTION, validator(NumberValidator::with_metadata)),
        (BooleanValidator::NAME, BooleanValidator::DESCRIPTION, validator(BooleanValidator::with_metadata)),
        (EnumValidator::NAME, EnumValidator::DESCRIPTION, validator(EnumValidator::with_metadata)),
        (UrlValidator::NAME, UrlValidator::DESCRIPTION, validator(UrlValidator::with_metadata)),
        (EmailValidator::NAME, EmailValidator::DESCRIPTION, validator(EmailValidator::with_metadata)),
        (PortValidator::NAME, PortValidator::DESCRIPTION, validator(PortValidator::with_metadata)),
        (JsonValidator::NAME, JsonValidator::DESCRIPTION, validator(JsonValidator::with_metadata)),
        (TruncateTransformer::NAME, TruncateTransformer::DESCRIPTION, transformer(TruncateTransformer::with_metadata)),
        (UppercaseTransformer::NAME, UppercaseTransformer::DESCRIPTION, transformer(UppercaseTransformer::with_metadata)),
        (LowercaseTransformer::NAME, LowercaseTransformer::DESCRIPTION, transformer(LowercaseTransformer::with_metadata)),
        (TrimTransformer::NAME, TrimTransformer::DESCRIPTION, transformer(TrimTransformer::with_metadata)),
        (ReplaceTransformer::NAME, ReplaceTransformer::DESCRIPTION, transformer(ReplaceTransformer::with_metadata)),
        (Base64Transformer::NAME, Base64Transformer::DESCRIPTION, transformer(Base64Transformer::with_metadata)),
    ]
}

/// Catalog entries for [`CatalogLoader::builtin`](super::CatalogLoader::builtin)
pub(crate) fn catalog_entries() -> Vec<(&'static str, PluginFactory)> {
    builtins()
        .into_iter()
        .map(|(name, _, factory)| (name, factory))
        .collect()
}

/// Registers every built-in, returning the registrations that were refused
pub(crate) fn register_builtins(registry: &mut PluginRegistry) -> Vec<PluginError> {
    builtins()
        .into_iter()
        .filter_map(|(name, description, factory)| {
            registry
                .register(factory(PluginMetadata::builtin(name, description)))
                .err()
        })
        .collect()
}

/// A parameter that is present but unusable
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParamError {
    key: String,
    expected: &'static str,
    actual: String,
}

impl ParamError {
    fn message(&self) -> String {
        format!("parameter '{}' must be {}", self.key, self.expected)
    }

    /// Report for a misconfigured validator
    pub(crate) fn into_config_error(self) -> ValidationError {
        ValidationError::new(ErrorCode::VarInvalidConfiguration, self.message())
            .with_expected(self.expected)
            .with_actual(self.actual)
    }

    /// Report for a misconfigured transform step
    pub(crate) fn into_transform_error(self) -> ValidationError {
        ValidationError::new(ErrorCode::TransformInvalidParameter, self.message())
            .with_expected(self.expected)
            .with_actual(self.actual)
    }
}

/// Reads an optional parameter with `read`; a value `read` rejects is an error
pub(crate) fn param<T>(
    params: &Params,
    key: &str,
    expected: &'static str,
    read: impl Fn(&Value) -> Option<T>,
) -> Result<Option<T>, ParamError> {
    match params.get(key) {
        None => Ok(None),
        Some(value) => read(value).map(Some).ok_or_else(|| ParamError {
            key: key.to_string(),
            expected,
            actual: value.to_string(),
        }),
    }
}

/// Non-negative integer, from a number or numeric string
pub(crate) fn as_count(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Finite number, from a number or numeric string
pub(crate) fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

pub(crate) fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Scalar rendered as text
pub(crate) fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// JSON array of scalars, or a comma separated string
pub(crate) fn as_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => items.iter().map(as_text).collect(),
        Value::String(s) => Some(s.split(',').map(|item| item.trim().to_string()).collect()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => map,
            _ => Params::new(),
        }
    }

    #[test]
    fn test_param_readers() {
        let p = params(json!({
            "maxLength": 5,
            "min": "1.5",
            "integer": "true",
            "values": ["a", 1, true],
            "schemes": "http, https"
        }));
        assert_eq!(param(&p, "maxLength", "a count", as_count).unwrap(), Some(5));
        assert_eq!(param(&p, "min", "a number", as_float).unwrap(), Some(1.5));
        assert_eq!(param(&p, "integer", "a boolean", as_flag).unwrap(), Some(true));
        assert_eq!(
            param(&p, "values", "a list", as_list).unwrap(),
            Some(vec!["a".to_string(), "1".to_string(), "true".to_string()])
        );
        assert_eq!(
            param(&p, "schemes", "a list", as_list).unwrap(),
            Some(vec!["http".to_string(), "https".to_string()])
        );
        assert_eq!(param(&p, "absent", "a count", as_count).unwrap(), None);
    }

    #[test]
    fn test_param_rejects_wrong_shape() {
        let p = params(json!({ "maxLength": -1 }));
        let err = param(&p, "maxLength", "a non-negative integer", as_count).unwrap_err();
        let report = err.into_transform_error();
        assert_eq!(report.code, ErrorCode::TransformInvalidParameter);
        assert_eq!(report.actual.as_deref(), Some("-1"));
    }

    #[test]
    fn test_catalog_and_registration_agree() {
        let names: Vec<&str> = catalog_entries().iter().map(|(name, _)| *name).collect();
        assert_eq!(names.len(), 14);
        let registry = PluginRegistry::with_builtins();
        let listing = registry.list();
        assert_eq!(listing.validators.len() + listing.transformers.len(), names.len());
        assert_eq!(
            registry.validator("port").unwrap().metadata().description.as_deref(),
            Some(PortValidator::DESCRIPTION)
        );
    }
}
