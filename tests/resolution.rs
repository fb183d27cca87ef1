//! End-to-end resolution through the public API

use envpipe::graph;
use envpipe::outcome::combine;
use envpipe::prelude::*;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rstest::rstest;
use serde_json::json;

fn parser() -> PipeParser {
    PipeParser::new(ParserOptions::default())
}

fn define(name: &str, pipe: &str) -> VariableDefinition {
    let raw = RawVariable::new(name, pipe);
    let config = parser().parse(pipe, None).unwrap();
    VariableDefinition::from_parts(raw, config)
}

#[test]
fn parses_flat_parameters() {
    let config = parser().parse("string|minLength:3|maxLength:10", None).unwrap();
    assert_eq!(config.type_name, "string");
    assert_eq!(
        serde_json::Value::Object(config.params),
        json!({"minLength": 3, "maxLength": 10})
    );
}

#[test]
fn folds_dotted_parameters() {
    let config = parser()
        .parse(r#"number|prompt.type:select|prompt.label:"Pick one""#, None)
        .unwrap();
    assert_eq!(config.type_name, "number");
    assert_eq!(
        serde_json::Value::Object(config.params),
        json!({"prompt": {"type": "select", "label": "Pick one"}})
    );
}

#[tokio::test]
async fn reports_mutual_reference_cycle() {
    let registry = PluginRegistry::with_builtins();
    let vars = variables! {
        A => r#"string|default:"${B}""#,
        B => r#"string|default:"${A}""#,
    };
    let errors = envpipe::run(vars, &registry, ResolveOptions::default())
        .await
        .unwrap_err();
    let cycle = errors
        .errors
        .iter()
        .find(|e| e.code == ErrorCode::VarCircularDependency)
        .unwrap();
    assert_eq!(cycle.actual.as_deref(), Some("A -> B -> A"));

    let definitions = vec![
        define("A", r#"string|default:"${B}""#),
        define("B", r#"string|default:"${A}""#),
    ];
    let analysis = graph::DependencyGraph::build(&definitions).analyze(false);
    assert_eq!(analysis.cycles, vec![vec!["A".to_string(), "B".to_string(), "A".to_string()]]);
    assert!(graph::resolve(&definitions, false).is_err());
}

#[tokio::test]
async fn truncates_through_the_pipeline() {
    let registry = PluginRegistry::with_builtins();
    let vars = variables! {
        GREETING => "string|required|transform:truncate,maxLength:5" = "hello world",
    };
    let resolved = envpipe::run(vars, &registry, ResolveOptions::default())
        .await
        .unwrap();
    assert_eq!(resolved.get("GREETING"), Some("hello"));
}

#[tokio::test]
async fn unknown_type_fails_only_its_variable() {
    let registry = PluginRegistry::with_builtins();
    let vars = variables! {
        X => "weirdtype|required" = "anything",
        Y => "number|min:1|required" = "42",
    };
    let errors = envpipe::run(vars, &registry, ResolveOptions::default())
        .await
        .unwrap_err();

    let failures: Vec<_> = errors.errors.iter().filter_map(ValidationError::variable).collect();
    assert_eq!(failures, vec!["X"]);
    assert_eq!(errors.errors[0].code, ErrorCode::VarTypeMismatch);

    let state = |name: &str| {
        errors
            .states
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.state)
    };
    assert_eq!(state("X"), Some(VariableState::ValidationError));
    assert_eq!(state("Y"), Some(VariableState::Resolved));
}

#[tokio::test]
async fn supplied_value_does_not_excuse_missing_required_or_default() {
    let registry = PluginRegistry::with_builtins();
    let vars = variables! {
        X => "string" = "v",
    };
    let errors = envpipe::run(vars, &registry, ResolveOptions::default())
        .await
        .unwrap_err();
    assert_eq!(errors.errors.len(), 1);
    assert_eq!(errors.errors[0].code, ErrorCode::VarInvalidConfiguration);
    assert_eq!(errors.errors[0].variable(), Some("X"));
}

#[tokio::test]
async fn tolerated_cycle_without_a_usable_default_still_fails() {
    let registry = PluginRegistry::with_builtins();
    let vars = variables! {
        A => "string|required" = "${B}",
        B => r#"string|default:"${A}""#,
    };
    let options = ResolveOptions::default().allow_circular(true);
    let errors = envpipe::run(vars, &registry, options).await.unwrap_err();
    assert!(
        errors
            .errors
            .iter()
            .any(|e| e.code == ErrorCode::VarCircularDependency)
    );
}

#[rstest]
#[case::allowed(false, true)]
#[case::strict(true, false)]
#[tokio::test]
async fn strict_mode_promotes_warnings(#[case] strict: bool, #[case] succeeds: bool) {
    let registry = PluginRegistry::with_builtins();
    let vars = variables! {
        HTTP_PORT => "port|required" = "80",
    };
    let options = ResolveOptions::default().strict(strict);
    let outcome = envpipe::run(vars, &registry, options).await;
    assert_eq!(outcome.is_ok(), succeeds);
    if let Err(errors) = outcome {
        assert!(errors.errors.iter().all(|e| e.severity == Severity::Error));
    }
}

#[tokio::test]
async fn errors_carry_source_locations() {
    let registry = PluginRegistry::with_builtins();
    let vars = vec![
        RawVariable::new("PORT", "port|required")
            .with_value("99999")
            .at_line(7)
            .in_file("env.yaml"),
    ];
    let errors = envpipe::run(vars, &registry, ResolveOptions::default())
        .await
        .unwrap_err();
    let source = errors.errors[0].source.clone().unwrap();
    assert_eq!(source.file.as_deref(), Some("env.yaml"));
    assert_eq!(source.line, Some(7));
    assert_eq!(source.variable.as_deref(), Some("PORT"));
}

#[test]
fn aggregated_errors_serialize_codes() {
    let error = ValidationError::new(ErrorCode::VarMissingRequired, "'KEY' is required");
    let json = serde_json::to_value(&error).unwrap();
    assert_eq!(json["code"], "VAR_MISSING_REQUIRED");
}

proptest! {
    #[test]
    fn simple_pipes_round_trip_type_and_param(
        type_name in "[a-z][a-z0-9]{0,10}",
        key in "[a-z][a-zA-Z]{0,10}",
        value in 0u32..100_000,
    ) {
        let keywords = ["required", "default", "transform", "constructor", "prototype", "true", "false"];
        prop_assume!(!keywords.contains(&key.as_str()) && !keywords.contains(&type_name.as_str()));
        let config = parser().parse(&format!("{type_name}|{key}:{value}"), None).unwrap();
        prop_assert_eq!(config.type_name, type_name);
        prop_assert_eq!(config.params.get(&key), Some(&json!(value)));
    }

    #[test]
    fn deep_paths_are_rejected(depth in 6usize..12) {
        let path = vec!["seg"; depth].join(".");
        let errors = parser().parse(&format!("string|{path}:1"), None).unwrap_err();
        prop_assert!(errors.iter().any(|e| e.code == ErrorCode::PipeParseMaxDepthExceeded));
    }

    #[test]
    fn combine_keeps_every_error_in_order(
        items in prop::collection::vec(prop::result::maybe_ok(0u8..10, prop::collection::vec(0u8..10, 1..3)), 0..8)
    ) {
        let expected: Vec<u8> = items
            .iter()
            .filter_map(|r| r.as_ref().err())
            .flatten()
            .copied()
            .collect();
        let all_ok = items.iter().all(Result::is_ok);
        match combine(items) {
            Ok(values) => prop_assert!(all_ok && values.len() <= 8),
            Err(errors) => {
                prop_assert!(!all_ok);
                prop_assert_eq!(errors, expected);
            }
        }
    }
}
