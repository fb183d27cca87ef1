//! Plugin registration, discovery and containment

use async_trait::async_trait;
use envpipe::errors::PluginError;
use envpipe::plugins::PluginOptions;
use envpipe::prelude::*;
use pretty_assertions::assert_eq;
use std::fs;

/// Accepts only lowercase host names
struct Hostname(PluginMetadata);

#[async_trait]
impl Validator for Hostname {
    fn metadata(&self) -> &PluginMetadata {
        &self.0
    }

    async fn validate(&self, value: &str, _params: &Params) -> ValidationResult {
        if value.chars().all(|c| c.is_ascii_lowercase() || c == '.' || c == '-') {
            ValidationResult::ok(value)
        } else {
            ValidationResult::fail(
                ValidationError::new(ErrorCode::VarConstraintViolation, "not a hostname")
                    .with_actual(value),
            )
        }
    }
}

struct Panicking(PluginMetadata);

#[async_trait]
impl Transformer for Panicking {
    fn metadata(&self) -> &PluginMetadata {
        &self.0
    }

    async fn transform(
        &self,
        _value: &str,
        _params: &Params,
        _context: &VariableContext<'_>,
    ) -> Result<String, ValidationError> {
        panic!("boom")
    }
}

#[tokio::test]
async fn explicit_validator_takes_part_in_resolution() {
    let mut registry = PluginRegistry::with_builtins();
    registry
        .register_validator(Hostname(PluginMetadata::new("hostname", "1.0.0")))
        .unwrap();
    let vars = variables! {
        GOOD => "hostname|required" = "db.internal",
        BAD => "hostname|required" = "DB_INTERNAL",
    };
    let errors = envpipe::run(vars, &registry, ResolveOptions::default())
        .await
        .unwrap_err();
    assert_eq!(errors.errors.len(), 1);
    assert_eq!(errors.errors[0].variable(), Some("BAD"));
}

#[test]
fn duplicate_registration_keeps_the_first_plugin() {
    let mut registry = PluginRegistry::new();
    registry
        .register_validator(Hostname(PluginMetadata::new("host", "1.0.0")))
        .unwrap();
    let err = registry
        .register_validator(Hostname(PluginMetadata::new("host", "2.0.0")))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::PluginDuplicateName);
    assert_eq!(registry.validator("host").unwrap().metadata().version, "1.0.0");
}

#[tokio::test]
async fn panicking_transformer_only_fails_its_variable() {
    let mut registry = PluginRegistry::with_builtins();
    registry
        .register_transformer(Panicking(PluginMetadata::new("explode", "0.1.0")))
        .unwrap();
    let vars = variables! {
        A => "string|required|transform:explode" = "x",
        B => "string|required|transform:uppercase" = "y",
    };
    let errors = envpipe::run(vars, &registry, ResolveOptions::default())
        .await
        .unwrap_err();
    assert_eq!(errors.errors.len(), 1);
    assert_eq!(errors.errors[0].code, ErrorCode::TransformExecutionError);
    let b = errors.states.iter().find(|s| s.name == "B").unwrap();
    assert_eq!(b.state, VariableState::Resolved);
}

#[tokio::test]
async fn discovered_plugins_resolve_templates() {
    let dir = tempfile::tempdir().unwrap();
    let validators = dir.path().join("validators");
    let transformers = dir.path().join("transformers");
    fs::create_dir(&validators).unwrap();
    fs::create_dir(&transformers).unwrap();
    fs::write(
        validators.join("region.validator.yaml"),
        "name: region\nversion: 1.0.0\ndescription: Cloud region\nentry: enum\n",
    )
    .unwrap();
    fs::write(
        transformers.join("shout.transformer.yaml"),
        "name: shout\nversion: 1.0.0\nentry: uppercase\n",
    )
    .unwrap();
    fs::write(transformers.join("bogus.transformer.yaml"), "name: bogus\nversion: 1.0.0\nentry: nothing\n").unwrap();

    let options = PluginOptions {
        validator_dirs: vec![validators],
        transformer_dirs: vec![transformers],
        ..PluginOptions::default()
    };
    let mut registry = PluginRegistry::with_builtins();
    let report = registry
        .discover_configured(&options, &CatalogLoader::builtin())
        .await
        .unwrap();
    assert_eq!(report.registered.len(), 2);
    assert_eq!(report.errors.len(), 1);
    assert!(matches!(report.errors[0], PluginError::LoadFailed { .. }));

    let vars = variables! {
        REGION => r#"region|values:["eu-west","us-east"]|required|transform:shout"# = "eu-west",
    };
    let resolved = envpipe::run(vars, &registry, ResolveOptions::default())
        .await
        .unwrap();
    assert_eq!(resolved.get("REGION"), Some("EU-WEST"));
}
