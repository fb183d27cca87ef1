//! Built-in validators

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{ParamError, as_count, as_flag, as_float, as_list, as_text, param};
use crate::errors::{ErrorCode, ValidationError};
use crate::macros::builtin_plugin;
use crate::outcome::ValidationResult;
use crate::plugins::traits::{Params, PluginMetadata, Validator};

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@.]+(\.[^\s@.]+)+$").expect("email pattern is valid")
});

/// Longest address accepted by the `email` validator
const MAX_EMAIL_LENGTH: usize = 254;
/// Ports below this need elevated privileges on most systems
const FIRST_UNPRIVILEGED_PORT: u16 = 1024;

fn violation(message: impl Into<String>) -> ValidationError {
    ValidationError::new(ErrorCode::VarConstraintViolation, message)
}

fn mismatch(type_name: &str, value: &str) -> ValidationError {
    ValidationError::new(
        ErrorCode::VarTypeMismatch,
        format!("'{value}' is not a valid {type_name}"),
    )
    .with_expected(type_name)
    .with_actual(value)
}

fn config<T>(read: Result<T, ParamError>) -> Result<T, ValidationError> {
    read.map_err(ParamError::into_config_error)
}

fn bounds_error(low: &str, high: &str) -> ValidationError {
    ValidationError::new(
        ErrorCode::VarInvalidConfiguration,
        format!("'{low}' is greater than '{high}'"),
    )
}

/// Folds collected violations into a result for `value`
fn finish(value: &str, errors: Vec<ValidationError>) -> ValidationResult {
    if errors.is_empty() {
        ValidationResult::ok(value)
    } else {
        ValidationResult::fail_many(errors)
    }
}

builtin_plugin!(
    /// Text with optional length, pattern and allowed-options rules
    StringValidator,
    "string",
    "Text values with length and pattern rules"
);

struct StringRules {
    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern: Option<Regex>,
    options: Option<Vec<String>>,
}

impl StringRules {
    fn from_params(params: &Params) -> Result<Self, ValidationError> {
        let min_length = config(param(params, "minLength", "a non-negative integer", as_count))?;
        let max_length = config(param(params, "maxLength", "a non-negative integer", as_count))?;
        if min_length.zip(max_length).is_some_and(|(min, max)| min > max) {
            return Err(bounds_error("minLength", "maxLength"));
        }
        let pattern = config(param(params, "pattern", "a regular expression", as_text))?
            .map(|source| {
                Regex::new(&source).map_err(|e| {
                    ValidationError::new(
                        ErrorCode::VarInvalidConfiguration,
                        format!("invalid pattern: {e}"),
                    )
                    .with_actual(source.clone())
                })
            })
            .transpose()?;
        let options = config(param(params, "options", "a list of strings", as_list))?;
        Ok(Self {
            min_length,
            max_length,
            pattern,
            options,
        })
    }
}

#[async_trait]
impl Validator for StringValidator {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn validate(&self, value: &str, params: &Params) -> ValidationResult {
        let rules = match StringRules::from_params(params) {
            Ok(rules) => rules,
            Err(error) => return ValidationResult::fail(error),
        };
        let length = value.chars().count();
        let mut errors = Vec::new();

        if let Some(min) = rules.min_length.filter(|&min| length < min) {
            errors.push(
                violation(format!("must be at least {min} characters long"))
                    .with_expected(format!(">= {min} characters"))
                    .with_actual(format!("{length} characters")),
            );
        }
        if let Some(max) = rules.max_length.filter(|&max| length > max) {
            errors.push(
                violation(format!("must be at most {max} characters long"))
                    .with_expected(format!("<= {max} characters"))
                    .with_actual(format!("{length} characters"))
                    .with_suggestion("use the truncate transform to shorten the value"),
            );
        }
        if let Some(pattern) = rules.pattern.filter(|p| !p.is_match(value)) {
            errors.push(
                violation("does not match the required pattern")
                    .with_expected(pattern.as_str().to_string())
                    .with_actual(value),
            );
        }
        if let Some(options) = rules.options.filter(|o| !o.iter().any(|o| o == value)) {
            errors.push(
                violation("is not one of the allowed options")
                    .with_expected(options.join(", "))
                    .with_actual(value),
            );
        }

        let mut result = finish(value, errors);
        if value.trim() != value {
            result = result.with_warning(ValidationError::warning(
                ErrorCode::VarConstraintViolation,
                "has leading or trailing whitespace",
            )
            .with_suggestion("apply the trim transform"));
        }
        result
    }
}

builtin_plugin!(
    /// Finite numbers with optional bounds and an integer flag
    NumberValidator,
    "number",
    "Numeric values with range rules"
);

struct NumberRules {
    min: Option<f64>,
    max: Option<f64>,
    integer: bool,
}

impl NumberRules {
    fn from_params(params: &Params) -> Result<Self, ValidationError> {
        let min = config(param(params, "min", "a number", as_float))?;
        let max = config(param(params, "max", "a number", as_float))?;
        let integer = config(param(params, "integer", "a boolean", as_flag))?.unwrap_or(false);
        if min.zip(max).is_some_and(|(min, max)| min > max) {
            return Err(bounds_error("min", "max"));
        }
        Ok(Self { min, max, integer })
    }
}

#[async_trait]
impl Validator for NumberValidator {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn validate(&self, value: &str, params: &Params) -> ValidationResult {
        let NumberRules { min, max, integer } = match NumberRules::from_params(params) {
            Ok(rules) => rules,
            Err(error) => return ValidationResult::fail(error),
        };

        let Some(number) = value.parse::<f64>().ok().filter(|n| n.is_finite()) else {
            return ValidationResult::fail(mismatch("number", value));
        };
        let mut errors = Vec::new();
        if integer && number.fract() != 0.0 {
            errors.push(
                violation("must be an integer")
                    .with_expected("integer")
                    .with_actual(value),
            );
        }
        if let Some(min) = min.filter(|&min| number < min) {
            errors.push(
                violation(format!("must be at least {min}"))
                    .with_expected(format!(">= {min}"))
                    .with_actual(value),
            );
        }
        if let Some(max) = max.filter(|&max| number > max) {
            errors.push(
                violation(format!("must be at most {max}"))
                    .with_expected(format!("<= {max}"))
                    .with_actual(value),
            );
        }
        finish(value, errors)
    }
}

builtin_plugin!(
    /// `true`/`false` and the usual spellings (`yes`, `no`, `on`, `off`, `1`, `0`)
    BooleanValidator,
    "boolean",
    "Boolean flags"
);

#[async_trait]
impl Validator for BooleanValidator {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn validate(&self, value: &str, _params: &Params) -> ValidationResult {
        match value.to_ascii_lowercase().as_str() {
            "true" | "false" | "yes" | "no" | "on" | "off" | "1" | "0" => ValidationResult::ok(value),
            _ => ValidationResult::fail(
                mismatch("boolean", value)
                    .with_suggestion("use true or false"),
            ),
        }
    }
}

builtin_plugin!(
    /// Membership in a fixed list of values
    EnumValidator,
    "enum",
    "One of a fixed set of values"
);

#[async_trait]
impl Validator for EnumValidator {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn validate(&self, value: &str, params: &Params) -> ValidationResult {
        let rules = config(param(params, "values", "a list of values", as_list)).and_then(|values| {
            let case_sensitive =
                config(param(params, "caseSensitive", "a boolean", as_flag))?.unwrap_or(true);
            values
                .filter(|v| !v.is_empty())
                .map(|values| (values, case_sensitive))
                .ok_or_else(|| {
                    ValidationError::new(
                        ErrorCode::VarInvalidConfiguration,
                        "enum requires a non-empty 'values' parameter",
                    )
                    .with_suggestion("add values:[\"a\",\"b\"]")
                })
        });
        let (values, case_sensitive) = match rules {
            Ok(rules) => rules,
            Err(error) => return ValidationResult::fail(error),
        };

        let found = values.iter().any(|candidate| {
            if case_sensitive {
                candidate == value
            } else {
                candidate.eq_ignore_ascii_case(value)
            }
        });
        if found {
            ValidationResult::ok(value)
        } else {
            ValidationResult::fail(
                violation(format!("'{value}' is not an allowed value"))
                    .with_expected(values.join(", "))
                    .with_actual(value),
            )
        }
    }
}

builtin_plugin!(
    /// Absolute URLs, optionally restricted to a list of schemes
    UrlValidator,
    "url",
    "Absolute URLs"
);

#[async_trait]
impl Validator for UrlValidator {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn validate(&self, value: &str, params: &Params) -> ValidationResult {
        let schemes = match config(param(params, "schemes", "a list of schemes", as_list)) {
            Ok(schemes) => schemes,
            Err(error) => return ValidationResult::fail(error),
        };
        let parsed = match url::Url::parse(value) {
            Ok(parsed) => parsed,
            Err(e) => {
                return ValidationResult::fail(
                    mismatch("url", value).with_suggestion(format!("fix the URL: {e}")),
                );
            }
        };
        match schemes {
            Some(schemes) if !schemes.iter().any(|s| s.eq_ignore_ascii_case(parsed.scheme())) => {
                ValidationResult::fail(
                    violation(format!("scheme '{}' is not allowed", parsed.scheme()))
                        .with_expected(schemes.join(", "))
                        .with_actual(parsed.scheme()),
                )
            }
            _ => ValidationResult::ok(value),
        }
    }
}

builtin_plugin!(
    /// Email addresses (`local@domain.tld`)
    EmailValidator,
    "email",
    "Email addresses"
);

#[async_trait]
impl Validator for EmailValidator {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn validate(&self, value: &str, _params: &Params) -> ValidationResult {
        if value.len() > MAX_EMAIL_LENGTH {
            return ValidationResult::fail(
                violation(format!("must be at most {MAX_EMAIL_LENGTH} bytes long"))
                    .with_actual(format!("{} bytes", value.len())),
            );
        }
        if EMAIL_PATTERN.is_match(value) {
            ValidationResult::ok(value)
        } else {
            ValidationResult::fail(mismatch("email", value).with_expected("local@domain.tld"))
        }
    }
}

builtin_plugin!(
    /// TCP/UDP ports, 1 to 65535
    PortValidator,
    "port",
    "Network port numbers"
);

#[async_trait]
impl Validator for PortValidator {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn validate(&self, value: &str, _params: &Params) -> ValidationResult {
        let Ok(port) = value.parse::<u32>() else {
            return ValidationResult::fail(mismatch("port", value).with_expected("1-65535"));
        };
        match u16::try_from(port) {
            Ok(0) | Err(_) => ValidationResult::fail(
                violation("must be between 1 and 65535")
                    .with_expected("1-65535")
                    .with_actual(value),
            ),
            Ok(port) if port < FIRST_UNPRIVILEGED_PORT => {
                ValidationResult::ok(value).with_warning(ValidationError::warning(
                    ErrorCode::VarConstraintViolation,
                    format!("port {port} is privileged"),
                ))
            }
            Ok(_) => ValidationResult::ok(value),
        }
    }
}

builtin_plugin!(
    /// Well-formed JSON documents
    JsonValidator,
    "json",
    "JSON documents"
);

#[async_trait]
impl Validator for JsonValidator {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn validate(&self, value: &str, _params: &Params) -> ValidationResult {
        match serde_json::from_str::<serde_json::Value>(value) {
            Ok(_) => ValidationResult::ok(value),
            Err(e) => ValidationResult::fail(
                mismatch("json", value).with_suggestion(format!("fix the document: {e}")),
            ),
        }
    }
}
