//! Validation pipeline

use std::num::NonZeroUsize;
use std::time::Duration;
use tracing::debug;

use super::guarded;
use crate::errors::{ErrorCode, ValidationError};
use crate::outcome::{ValidationResult, traverse_all};
use crate::plugins::PluginRegistry;
use crate::variable::VariableDefinition;

/// Checks variable values with the registered validators
#[derive(Debug, Clone, Copy)]
pub struct ValidationPipeline<'r> {
    registry: &'r PluginRegistry,
    plugin_timeout: Duration,
}

impl<'r> ValidationPipeline<'r> {
    /// Creates a pipeline over `registry`; each validator call gets
    /// `plugin_timeout`
    #[must_use]
    pub fn new(registry: &'r PluginRegistry, plugin_timeout: Duration) -> Self {
        Self {
            registry,
            plugin_timeout,
        }
    }

    /// Validates one variable
    ///
    /// `value` is the value to check; when `None` the variable's default is
    /// used. Every error and warning is attributed to the variable.
    pub async fn validate_variable(
        &self,
        variable: &VariableDefinition,
        value: Option<&str>,
    ) -> ValidationResult {
        let location = variable.location();
        let result = self.check(variable, value).await;
        ValidationResult {
            errors: attribute(result.errors, &location),
            warnings: attribute(result.warnings, &location),
            ..result
        }
    }

    async fn check(&self, variable: &VariableDefinition, value: Option<&str>) -> ValidationResult {
        let value = value.or(variable.default_value.as_deref());
        let mut result = ValidationResult::empty();

        match (variable.required, variable.default_value.is_some()) {
            (true, true) => result.push_error(
                ValidationError::new(
                    ErrorCode::VarInvalidConfiguration,
                    format!("'{}' is required and also declares a default", variable.name),
                )
                .with_suggestion("drop either 'required' or the default"),
            ),
            (false, false) => {
                return ValidationResult::fail(
                    ValidationError::new(
                        ErrorCode::VarInvalidConfiguration,
                        format!("'{}' is neither required nor has a default", variable.name),
                    )
                    .with_suggestion("mark it 'required' or add 'default:<value>'"),
                );
            }
            _ => {}
        }

        let Some(value) = value.filter(|v| !(variable.required && v.is_empty())) else {
            result.push_error(
                ValidationError::new(
                    ErrorCode::VarMissingRequired,
                    format!("'{}' is required but no value was supplied", variable.name),
                )
                .with_suggestion(format!("set {}", variable.name)),
            );
            return result;
        };

        let Some(validator) = self.registry.validator(&variable.type_name) else {
            let known = self.registry.list().validators.join(", ");
            result.push_error(
                ValidationError::new(
                    ErrorCode::VarTypeMismatch,
                    format!("unknown type '{}'", variable.type_name),
                )
                .with_actual(variable.type_name.clone())
                .with_suggestion(format!("use one of: {known}")),
            );
            return result;
        };

        let checked = guarded(
            validator.validate(value, &variable.params),
            self.plugin_timeout,
            &validator.metadata().name,
            ErrorCode::PluginExecutionError,
        )
        .await
        .unwrap_or_else(ValidationResult::fail);

        if !checked.success {
            debug!(variable = %variable.name, errors = checked.errors.len(), "validation failed");
        }
        let mut combined = ValidationResult::combine([result, checked]);
        if combined.success {
            combined.value = Some(value.to_string());
        }
        combined
    }

    /// Validates many variables, `batch_size` at a time, and combines the
    /// results
    pub async fn validate_all(
        &self,
        variables: &[(VariableDefinition, Option<String>)],
        batch_size: NonZeroUsize,
    ) -> ValidationResult {
        let results = traverse_all(variables, batch_size, |(variable, value)| {
            self.validate_variable(variable, value.as_deref())
        })
        .await;
        ValidationResult::combine(results)
    }

    /// Applies strict mode: warnings become errors
    #[must_use]
    pub fn finalize(result: ValidationResult, strict: bool) -> ValidationResult {
        if strict {
            result.promote_warnings()
        } else {
            result
        }
    }
}

fn attribute(
    errors: Vec<ValidationError>,
    location: &crate::errors::SourceLocation,
) -> Vec<ValidationError> {
    errors
        .into_iter()
        .map(|error| error.attributed_to(location))
        .collect()
}
