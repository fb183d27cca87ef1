//! Transformation pipeline

use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::guarded;
use crate::errors::{ErrorCode, ValidationError};
use crate::plugins::{PluginRegistry, VariableContext};
use crate::variable::VariableDefinition;

/// Applies a variable's transform steps in declaration order
#[derive(Debug, Clone, Copy)]
pub struct TransformPipeline<'r> {
    registry: &'r PluginRegistry,
    plugin_timeout: Duration,
}

impl<'r> TransformPipeline<'r> {
    /// Creates a pipeline over `registry`; each step gets `plugin_timeout`
    #[must_use]
    pub fn new(registry: &'r PluginRegistry, plugin_timeout: Duration) -> Self {
        Self {
            registry,
            plugin_timeout,
        }
    }

    /// Runs every step of `variable` starting from `value`
    ///
    /// `resolved` holds the variables finished so far; steps see it read-only.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error, attributed to the variable.
    /// Later steps are not run.
    pub async fn apply(
        &self,
        variable: &VariableDefinition,
        value: &str,
        resolved: &HashMap<String, String>,
    ) -> Result<String, ValidationError> {
        let location = variable.location();
        let context = VariableContext::new(resolved, &variable.name);
        let mut current = value.to_string();

        for step in &variable.transforms {
            let Some(transformer) = self.registry.transformer(&step.name) else {
                let known = self.registry.list().transformers.join(", ");
                return Err(ValidationError::new(
                    ErrorCode::TransformNotFound,
                    format!("unknown transform '{}'", step.name),
                )
                .with_actual(step.name.clone())
                .with_suggestion(format!("use one of: {known}"))
                .attributed_to(&location));
            };
            current = guarded(
                transformer.transform(&current, &step.params, &context),
                self.plugin_timeout,
                &step.name,
                ErrorCode::TransformExecutionError,
            )
            .await
            .and_then(|output| output)
            .map_err(|error| error.attributed_to(&location))?;
            debug!(variable = %variable.name, step = %step.name, "applied transform");
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{Params, PluginMetadata, Transformer};
    use crate::syntax::{ParserOptions, PipeParser};
    use crate::variable::RawVariable;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    /// Appends the value of another variable, read from the context
    struct Suffix(PluginMetadata);

    #[async_trait]
    impl Transformer for Suffix {
        fn metadata(&self) -> &PluginMetadata {
            &self.0
        }

        async fn transform(
            &self,
            value: &str,
            params: &Params,
            context: &VariableContext<'_>,
        ) -> Result<String, ValidationError> {
            let from = params.get("from").and_then(|v| v.as_str()).unwrap_or_default();
            Ok(format!("{value}{}", context.get(from).unwrap_or_default()))
        }
    }

    struct Broken(PluginMetadata);

    #[async_trait]
    impl Transformer for Broken {
        fn metadata(&self) -> &PluginMetadata {
            &self.0
        }

        async fn transform(
            &self,
            _value: &str,
            _params: &Params,
            _context: &VariableContext<'_>,
        ) -> Result<String, ValidationError> {
            panic!("transformer bug")
        }
    }

    fn define(pipe: &str) -> VariableDefinition {
        let raw = RawVariable::new("NAME", pipe);
        let config = PipeParser::new(ParserOptions::default()).parse(pipe, None).unwrap();
        VariableDefinition::from_parts(raw, config)
    }

    fn registry() -> PluginRegistry {
        let mut registry = PluginRegistry::with_builtins();
        registry
            .register_transformer(Suffix(PluginMetadata::new("suffix", "0.1.0")))
            .unwrap();
        registry
            .register_transformer(Broken(PluginMetadata::new("broken", "0.1.0")))
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_steps_run_in_order() {
        let registry = registry();
        let pipeline = TransformPipeline::new(&registry, Duration::from_secs(1));
        let variable = define("string|required|transform:trim|transform:truncate,maxLength:5|transform:uppercase");
        let output = pipeline
            .apply(&variable, "  hello world ", &HashMap::new())
            .await
            .unwrap();
        assert_eq!(output, "HELLO");
    }

    #[tokio::test]
    async fn test_context_exposes_resolved_variables() {
        let registry = registry();
        let pipeline = TransformPipeline::new(&registry, Duration::from_secs(1));
        let resolved = HashMap::from([("ENV".to_string(), "-prod".to_string())]);
        let variable = define("string|required|transform:suffix,from:ENV");
        let output = pipeline.apply(&variable, "api", &resolved).await.unwrap();
        assert_eq!(output, "api-prod");
    }

    #[tokio::test]
    async fn test_first_failure_stops_the_chain() {
        let registry = registry();
        let pipeline = TransformPipeline::new(&registry, Duration::from_secs(1));

        let variable = define("string|required|transform:missing|transform:broken");
        let err = pipeline.apply(&variable, "x", &HashMap::new()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::TransformNotFound);
        assert_eq!(err.variable(), Some("NAME"));

        let variable = define("string|required|transform:broken|transform:missing");
        let err = pipeline.apply(&variable, "x", &HashMap::new()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::TransformExecutionError);

        let variable = define("string|required|transform:truncate");
        let err = pipeline.apply(&variable, "x", &HashMap::new()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::TransformMissingParameter);
    }
}
