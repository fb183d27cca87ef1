//! `envpipe check` - Resolve a template and report every problem
//!
//! A template is a YAML mapping from variable name to either a pipe string or
//! a `{pipe, value}` object:
//!
//! ```yaml
//! HOST: "string|default:localhost"
//! PORT:
//!   pipe: "port|required"
//!   value: 8080
//! ```
//!
//! ## Usage
//!
//! ```bash
//! envpipe check env.yaml --set PORT=8080 --strict
//! # Exit code 0: every variable resolved
//! # Exit code 1: errors found (all of them are listed)
//! ```

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_yaml::Value;
use std::fmt::Write as _;
use std::path::Path;

use envpipe::engine::{ResolveOptions, Resolver};
use envpipe::errors::{Severity, ValidationError};
use envpipe::infrastructure::Config;
use envpipe::plugins::{CatalogLoader, PluginRegistry};
use envpipe::variable::{RawVariable, VariableState, VariableStatus};

/// Settings for one check run
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// Treat warnings as errors
    pub strict: bool,
    /// Break cycles whose members have defaults
    pub allow_circular: bool,
    /// `NAME=VALUE` overrides
    pub overrides: Vec<String>,
    /// Skip plugin directory discovery
    pub no_discovery: bool,
}

/// Machine readable result of a check
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    /// True when every variable resolved
    pub success: bool,
    /// Resolved values, in declaration order
    pub variables: Vec<(String, String)>,
    /// Final state of every variable
    pub states: Vec<VariableStatus>,
    /// Blocking problems
    pub errors: Vec<ValidationError>,
    /// Non-blocking problems, including plugin discovery failures
    pub warnings: Vec<ValidationError>,
}

/// Parses template YAML into raw variables
pub fn parse_template(yaml: &str, file_name: &str) -> Result<Vec<RawVariable>> {
    let document: Value = serde_yaml::from_str(yaml).context("Template is not valid YAML")?;
    let Value::Mapping(entries) = document else {
        bail!("Template must be a mapping of variable names to pipe strings");
    };

    let mut variables = Vec::with_capacity(entries.len());
    for (key, entry) in entries {
        let Some(name) = key.as_str() else {
            bail!("Variable names must be strings, found {key:?}");
        };
        let (pipe, value) = match entry {
            Value::String(pipe) => (pipe, None),
            Value::Mapping(ref fields) => {
                let pipe = fields
                    .get("pipe")
                    .and_then(Value::as_str)
                    .with_context(|| format!("Variable '{name}' has no 'pipe' string"))?
                    .to_string();
                let value = fields.get("value").map(scalar_text).transpose()?;
                (pipe, value)
            }
            other => bail!("Variable '{name}' must be a pipe string or a mapping, found {other:?}"),
        };
        let mut variable = RawVariable::new(name, pipe).in_file(file_name);
        if let Some(line) = declaration_line(yaml, name) {
            variable = variable.at_line(line);
        }
        if let Some(value) = value {
            variable = variable.with_value(value);
        }
        variables.push(variable);
    }
    Ok(variables)
}

fn scalar_text(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => bail!("Values must be scalars, found {other:?}"),
    }
}

/// 1-based line of a top-level `NAME:` key
fn declaration_line(yaml: &str, name: &str) -> Option<usize> {
    yaml.lines()
        .position(|line| {
            let key = line.trim_end();
            key.strip_prefix(name)
                .is_some_and(|rest| rest.starts_with(':'))
                || key
                    .strip_prefix('"')
                    .and_then(|k| k.strip_prefix(name))
                    .is_some_and(|rest| rest.starts_with("\":"))
        })
        .map(|i| i + 1)
}

/// Applies `NAME=VALUE` overrides
pub fn apply_overrides(variables: &mut [RawVariable], overrides: &[String]) -> Result<()> {
    for assignment in overrides {
        let Some((name, value)) = assignment.split_once('=') else {
            bail!("Override '{assignment}' is not NAME=VALUE");
        };
        let variable = variables
            .iter_mut()
            .find(|v| v.name == name)
            .with_context(|| format!("Override for undeclared variable '{name}'"))?;
        variable.value = Some(value.to_string());
    }
    Ok(())
}

/// Loads, resolves and reports on a template file
pub async fn check_template(file: &Path, config: &Config, options: &CheckOptions) -> Result<CheckReport> {
    tracing::debug!("Checking template: {}", file.display());
    let yaml = std::fs::read_to_string(file)
        .with_context(|| format!("Template file not found: {}", file.display()))?;
    let mut variables = parse_template(&yaml, &file.display().to_string())?;
    apply_overrides(&mut variables, &options.overrides)?;

    let mut registry = PluginRegistry::with_builtins();
    let mut plugin_warnings = Vec::new();
    if !options.no_discovery {
        let report = registry
            .discover_configured(&config.plugins, &CatalogLoader::builtin())
            .await
            .context("Plugin discovery failed")?;
        plugin_warnings.extend(
            report
                .errors
                .into_iter()
                .map(|e| ValidationError::from(e).with_severity(Severity::Warning)),
        );
    }

    let resolve = ResolveOptions {
        strict: options.strict || config.resolve.strict,
        allow_circular: options.allow_circular || config.resolve.allow_circular,
        ..config.resolve
    };
    let outcome = Resolver::new(&registry, resolve)
        .with_parser_options(config.parser)
        .run(variables)
        .await;

    let mut report = match outcome {
        Ok(resolved) => CheckReport {
            success: true,
            variables: resolved
                .variables
                .into_iter()
                .map(|v| (v.name, v.value))
                .collect(),
            states: resolved.states,
            errors: Vec::new(),
            warnings: resolved.warnings,
        },
        Err(failed) => CheckReport {
            success: false,
            variables: Vec::new(),
            states: failed.states,
            errors: failed.errors,
            warnings: failed.warnings,
        },
    };
    plugin_warnings.append(&mut report.warnings);
    report.warnings = plugin_warnings;
    Ok(report)
}

/// Human readable report
pub fn render_text(report: &CheckReport) -> String {
    let mut out = String::new();
    for status in &report.states {
        let marker = if status.state == VariableState::Resolved { "ok" } else { "!!" };
        let value = report
            .variables
            .iter()
            .find(|(name, _)| *name == status.name)
            .map(|(_, value)| format!(" = {value}"))
            .unwrap_or_default();
        let _ = writeln!(out, "[{marker}] {}{value} ({})", status.name, status.state);
    }
    for (title, problems) in [("errors", &report.errors), ("warnings", &report.warnings)] {
        if problems.is_empty() {
            continue;
        }
        let _ = writeln!(out, "\n{title}:");
        for problem in problems {
            let location = problem
                .source
                .as_ref()
                .map(|s| format!(" [{s}]"))
                .unwrap_or_default();
            let _ = writeln!(out, "  {}{location}", problem);
            if let Some(suggestion) = &problem.suggestion {
                let _ = writeln!(out, "    hint: {suggestion}");
            }
        }
    }
    let _ = write!(
        out,
        "\n{} error(s), {} warning(s)",
        report.errors.len(),
        report.warnings.len()
    );
    out
}
