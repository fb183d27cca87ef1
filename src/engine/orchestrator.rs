//! Resolution orchestrator
//!
//! Drives every declared variable through the stages in order: parse all
//! pipe strings, order the reference graph, then resolve one dependency layer
//! at a time. Within a layer each variable is interpolated, validated and
//! transformed; independent variables are awaited together in batches.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use super::transform::TransformPipeline;
use super::validation::ValidationPipeline;
use crate::errors::{AggregatedErrors, ErrorCode, Severity, ValidationError};
use crate::graph::{DependencyGraph, interpolate};
use crate::outcome::traverse_all;
use crate::plugins::PluginRegistry;
use crate::syntax::{ParserOptions, PipeParser};
use crate::variable::{RawVariable, VariableDefinition, VariableState, VariableStatus};

/// Run settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveOptions {
    /// Treat warnings as errors
    pub strict: bool,
    /// Break cycles whose members all have usable defaults
    pub allow_circular: bool,
    /// Variables awaited together within a layer
    pub batch_size: NonZeroUsize,
    /// Limit for a single plugin call, in milliseconds
    pub plugin_timeout_ms: u64,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            strict: false,
            allow_circular: false,
            batch_size: NonZeroUsize::new(50).unwrap_or(NonZeroUsize::MIN),
            plugin_timeout_ms: 5000,
        }
    }
}

impl ResolveOptions {
    /// Sets strict mode
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Allows breakable cycles
    #[must_use]
    pub fn allow_circular(mut self, allow: bool) -> Self {
        self.allow_circular = allow;
        self
    }

    /// Sets the batch size
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: NonZeroUsize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the per-call plugin limit
    #[must_use]
    pub fn with_plugin_timeout(mut self, timeout: Duration) -> Self {
        self.plugin_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Per-call plugin limit
    #[must_use]
    pub fn plugin_timeout(&self) -> Duration {
        Duration::from_millis(self.plugin_timeout_ms)
    }
}

/// Final value of one variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedVariable {
    /// Variable name
    pub name: String,
    /// Value after interpolation and transforms
    pub value: String,
    /// Description from the pipe string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Output of a successful run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedVariables {
    /// Values in declaration order
    pub variables: Vec<ResolvedVariable>,
    /// Non-blocking problems
    pub warnings: Vec<ValidationError>,
    /// Final state of every variable
    pub states: Vec<VariableStatus>,
}

impl ResolvedVariables {
    /// Value of `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.value.as_str())
    }

    /// Values keyed by name
    #[must_use]
    pub fn to_map(&self) -> HashMap<String, String> {
        self.variables
            .iter()
            .map(|v| (v.name.clone(), v.value.clone()))
            .collect()
    }

    /// Number of resolved variables
    #[must_use]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Returns true if nothing was resolved
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

/// Errors, warnings and states collected during a run
#[derive(Default)]
struct Ledger {
    errors: Vec<ValidationError>,
    warnings: Vec<ValidationError>,
    states: Vec<VariableStatus>,
    index: HashMap<String, usize>,
}

impl Ledger {
    fn declare(&mut self, name: &str) -> bool {
        if self.index.contains_key(name) {
            return false;
        }
        self.index.insert(name.to_string(), self.states.len());
        self.states.push(VariableStatus {
            name: name.to_string(),
            state: VariableState::Unresolved,
            history: Vec::new(),
        });
        true
    }

    fn set(&mut self, name: &str, state: VariableState) {
        if let Some(&i) = self.index.get(name) {
            let status = &mut self.states[i];
            if status.state != state {
                trace!(variable = name, from = %status.state, to = %state, "state change");
                let previous = std::mem::replace(&mut status.state, state);
                status.history.push(previous);
            }
        }
    }

    fn state(&self, name: &str) -> VariableState {
        self.index
            .get(name)
            .map_or(VariableState::Unresolved, |&i| self.states[i].state)
    }

    fn failed(&self, name: &str) -> bool {
        self.state(name).is_failure()
    }

    fn report(&mut self, problem: ValidationError) {
        if problem.is_error() {
            self.errors.push(problem);
        } else {
            self.warnings.push(problem);
        }
    }
}

/// What happened to one variable inside a layer
struct Outcome {
    /// Intermediate states reached before `state`
    passed: Vec<VariableState>,
    state: VariableState,
    value: Option<String>,
    problems: Vec<ValidationError>,
}

/// Resolves a template's variables against a plugin registry
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'r> {
    registry: &'r PluginRegistry,
    options: ResolveOptions,
    parser: ParserOptions,
}

impl<'r> Resolver<'r> {
    /// Creates a resolver with default parser limits
    #[must_use]
    pub fn new(registry: &'r PluginRegistry, options: ResolveOptions) -> Self {
        Self {
            registry,
            options,
            parser: ParserOptions::default(),
        }
    }

    /// Sets the parser limits
    #[must_use]
    pub fn with_parser_options(mut self, parser: ParserOptions) -> Self {
        self.parser = parser;
        self
    }

    /// Resolves every variable
    ///
    /// # Errors
    ///
    /// Returns every error found by any stage, together with the warnings and
    /// the state each variable reached. In strict mode warnings count as
    /// errors.
    pub async fn run(&self, variables: Vec<RawVariable>) -> Result<ResolvedVariables, AggregatedErrors> {
        info!(count = variables.len(), "resolving variables");
        let mut ledger = Ledger::default();

        let definitions = self.parse_all(variables, &mut ledger);
        let by_name: HashMap<&str, &VariableDefinition> =
            definitions.iter().map(|d| (d.name.as_str(), d)).collect();

        let graph = DependencyGraph::build(&definitions);
        let analysis = graph.analyze(self.options.allow_circular);

        if let Some(error) = analysis.cycle_error() {
            let first = analysis.cycles.first().and_then(|c| c.first());
            let error = match first.and_then(|name| by_name.get(name.as_str())) {
                Some(variable) => error.attributed_to(&variable.location()),
                None => error,
            };
            ledger.report(error);
        }
        let cyclic: HashSet<&str> = analysis.cycles.iter().flatten().map(String::as_str).collect();

        // default that stands in for each broken reference, keyed by referrer
        let mut substitutes: HashMap<&str, HashMap<&str, &str>> = HashMap::new();
        for edge in &analysis.broken_edges {
            let (Some(&from), Some(&to)) =
                (by_name.get(edge.from.as_str()), by_name.get(edge.to.as_str()))
            else {
                continue;
            };
            let Some(default) = to.usable_default() else {
                continue;
            };
            substitutes.entry(&from.name).or_default().insert(&to.name, default);
            ledger.report(
                ValidationError::warning(
                    ErrorCode::VarCircularDependency,
                    format!(
                        "circular reference broken: '{}' uses the default of '{}'",
                        edge.from, edge.to
                    ),
                )
                .with_actual(format!("{} -> {}", edge.from, edge.to))
                .attributed_to(&from.location()),
            );
        }

        for name in &analysis.blocked {
            if cyclic.contains(name.as_str()) {
                ledger.set(name, VariableState::CircularError);
            } else {
                ledger.set(name, VariableState::DependencyFailed);
                if let Some(variable) = by_name.get(name.as_str()) {
                    ledger.report(
                        ValidationError::new(
                            ErrorCode::VarDependencyFailed,
                            format!("'{name}' depends on a variable in a circular reference"),
                        )
                        .attributed_to(&variable.location()),
                    );
                }
            }
        }

        for missing in &analysis.missing {
            let Some(variable) = by_name.get(missing.from.as_str()) else {
                continue;
            };
            // a declared name that failed to parse is a failed dependency, not a missing one
            if ledger.index.contains_key(&missing.name) {
                continue;
            }
            ledger.set(&missing.from, VariableState::DependencyFailed);
            ledger.report(missing.to_error().attributed_to(&variable.location()));
        }

        for name in &analysis.order {
            if !ledger.failed(name) {
                ledger.set(name, VariableState::GraphOrdered);
            }
        }

        let validation = ValidationPipeline::new(self.registry, self.options.plugin_timeout());
        let transform = TransformPipeline::new(self.registry, self.options.plugin_timeout());
        let mut resolved: HashMap<String, String> = HashMap::new();

        for layer in &analysis.layers {
            let mut ready = Vec::new();
            for name in layer {
                let Some(&variable) = by_name.get(name.as_str()) else {
                    continue;
                };
                if ledger.failed(name) {
                    continue;
                }
                let failed: Vec<&str> = variable
                    .dependencies
                    .iter()
                    .map(String::as_str)
                    .filter(|d| ledger.failed(d))
                    .collect();
                if failed.is_empty() {
                    ready.push(variable);
                    continue;
                }
                ledger.set(name, VariableState::DependencyFailed);
                ledger.report(
                    ValidationError::new(
                        ErrorCode::VarDependencyFailed,
                        format!("'{name}' depends on failed variable(s): {}", failed.join(", ")),
                    )
                    .with_actual(failed.join(", "))
                    .attributed_to(&variable.location()),
                );
            }

            let outcomes = traverse_all(ready.iter().copied(), self.options.batch_size, |variable| {
                self.resolve_one(
                    variable,
                    &resolved,
                    substitutes.get(variable.name.as_str()),
                    validation,
                    transform,
                )
            })
            .await;

            for (variable, outcome) in ready.iter().zip(outcomes) {
                for state in outcome.passed {
                    ledger.set(&variable.name, state);
                }
                ledger.set(&variable.name, outcome.state);
                for problem in outcome.problems {
                    ledger.report(problem);
                }
                if let Some(value) = outcome.value {
                    resolved.insert(variable.name.clone(), value);
                }
            }
        }

        self.finish(ledger, &definitions, resolved)
    }

    /// Parses every pipe string, recording parse failures
    fn parse_all(&self, variables: Vec<RawVariable>, ledger: &mut Ledger) -> Vec<VariableDefinition> {
        let parser = PipeParser::new(self.parser);
        let mut definitions = Vec::with_capacity(variables.len());
        for raw in variables {
            if !ledger.declare(&raw.name) {
                ledger.report(
                    ValidationError::new(
                        ErrorCode::VarInvalidConfiguration,
                        format!("'{}' is declared more than once", raw.name),
                    )
                    .attributed_to(&raw.location()),
                );
                continue;
            }
            match parser.parse(&raw.pipe, raw.source_line) {
                Ok(config) => {
                    ledger.set(&raw.name, VariableState::Parsed);
                    definitions.push(VariableDefinition::from_parts(raw, config));
                }
                Err(errors) => {
                    warn!(variable = %raw.name, errors = errors.len(), "pipe string rejected");
                    ledger.set(&raw.name, VariableState::ParseError);
                    let location = raw.location();
                    for error in errors {
                        ledger.report(error.attributed_to(&location));
                    }
                }
            }
        }
        definitions
    }

    /// Interpolates, validates and transforms one variable
    async fn resolve_one(
        &self,
        variable: &VariableDefinition,
        resolved: &HashMap<String, String>,
        substitutes: Option<&HashMap<&str, &str>>,
        validation: ValidationPipeline<'_>,
        transform: TransformPipeline<'_>,
    ) -> Outcome {
        let value = variable.effective_value().map(|text| {
            interpolate(text, |name| {
                substitutes
                    .and_then(|s| s.get(name).copied())
                    .or_else(|| resolved.get(name).map(String::as_str))
            })
        });

        let result = ValidationPipeline::finalize(
            validation.validate_variable(variable, value.as_deref()).await,
            self.options.strict,
        );
        let mut problems = result.warnings;
        if !result.success {
            problems.extend(result.errors);
            return Outcome {
                passed: Vec::new(),
                state: VariableState::ValidationError,
                value: None,
                problems,
            };
        }
        let validated = result.value.unwrap_or_default();

        if variable.transforms.is_empty() {
            debug!(variable = %variable.name, "resolved");
            return Outcome {
                passed: vec![VariableState::Validated],
                state: VariableState::Resolved,
                value: Some(validated),
                problems,
            };
        }
        match transform.apply(variable, &validated, resolved).await {
            Ok(value) => {
                debug!(variable = %variable.name, "resolved after transforms");
                Outcome {
                    passed: vec![VariableState::Validated, VariableState::Transformed],
                    state: VariableState::Resolved,
                    value: Some(value),
                    problems,
                }
            }
            Err(error) => {
                problems.push(error);
                Outcome {
                    passed: vec![VariableState::Validated],
                    state: VariableState::TransformError,
                    value: None,
                    problems,
                }
            }
        }
    }

    fn finish(
        &self,
        mut ledger: Ledger,
        definitions: &[VariableDefinition],
        mut resolved: HashMap<String, String>,
    ) -> Result<ResolvedVariables, AggregatedErrors> {
        if self.options.strict {
            let (promoted, kept): (Vec<_>, Vec<_>) = ledger
                .warnings
                .drain(..)
                .partition(|w| w.severity == Severity::Warning);
            ledger
                .errors
                .extend(promoted.into_iter().map(|w| w.with_severity(Severity::Error)));
            ledger.warnings = kept;
        }

        info!(
            resolved = resolved.len(),
            errors = ledger.errors.len(),
            warnings = ledger.warnings.len(),
            "resolution finished"
        );
        if !ledger.errors.is_empty() {
            return Err(AggregatedErrors {
                errors: ledger.errors,
                warnings: ledger.warnings,
                states: ledger.states,
            });
        }
        let variables = definitions
            .iter()
            .filter_map(|d| {
                resolved.remove(&d.name).map(|value| ResolvedVariable {
                    name: d.name.clone(),
                    value,
                    description: d.description.clone(),
                })
            })
            .collect();
        Ok(ResolvedVariables {
            variables,
            warnings: ledger.warnings,
            states: ledger.states,
        })
    }
}

/// Resolves `variables` against `registry`
///
/// # Errors
///
/// See [`Resolver::run`].
pub async fn run(
    variables: Vec<RawVariable>,
    registry: &PluginRegistry,
    options: ResolveOptions,
) -> Result<ResolvedVariables, AggregatedErrors> {
    Resolver::new(registry, options).run(variables).await
}
