//! Outcome combinators
//!
//! Every stage collects problems instead of stopping at the first one. The
//! helpers here implement that rule once: a combined outcome succeeds only if
//! every input succeeded, and a failed one carries every input's errors in
//! input order.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::num::NonZeroUsize;

use crate::errors::{Severity, ValidationError};

/// Outcome of validating one value (or many, once combined)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// True when no blocking error was found
    pub success: bool,
    /// Validated value, when there is a single one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Blocking problems
    pub errors: Vec<ValidationError>,
    /// Non-blocking problems
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ValidationError>,
}

impl ValidationResult {
    /// Successful result carrying the value
    #[must_use]
    pub fn ok(value: impl Into<String>) -> Self {
        Self {
            success: true,
            value: Some(value.into()),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Successful result without a value
    #[must_use]
    pub fn empty() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// Failed result with a single error
    #[must_use]
    pub fn fail(error: ValidationError) -> Self {
        Self::fail_many(vec![error])
    }

    /// Failed result with several errors
    #[must_use]
    pub fn fail_many(errors: Vec<ValidationError>) -> Self {
        Self {
            success: false,
            value: None,
            errors,
            warnings: Vec::new(),
        }
    }

    /// Appends a warning (or an info note) without touching `success`
    #[must_use]
    pub fn with_warning(mut self, warning: ValidationError) -> Self {
        self.warnings.push(warning);
        self
    }

    /// Appends a blocking error and marks the result failed
    pub fn push_error(&mut self, error: ValidationError) {
        self.success = false;
        self.errors.push(error);
    }

    /// Combines results: success iff all succeeded; errors and warnings are
    /// concatenated in input order. The value is kept only for a single input.
    #[must_use]
    pub fn combine(results: impl IntoIterator<Item = ValidationResult>) -> Self {
        let mut combined = Self::empty();
        let mut count = 0usize;
        for result in results {
            count += 1;
            combined.success &= result.success;
            combined.errors.extend(result.errors);
            combined.warnings.extend(result.warnings);
            combined.value = if count == 1 { result.value } else { None };
        }
        combined
    }

    /// Moves every warning into the error list with error severity
    ///
    /// Info notes are not warnings and stay where they are.
    #[must_use]
    pub fn promote_warnings(mut self) -> Self {
        let (notes, promoted): (Vec<_>, Vec<_>) = std::mem::take(&mut self.warnings)
            .into_iter()
            .partition(|w| w.severity == Severity::Info);
        self.warnings = notes;
        self.errors
            .extend(promoted.into_iter().map(|w| w.with_severity(Severity::Error)));
        self.success = self.success && self.errors.is_empty();
        self
    }

    /// Converts into a `Result`, keeping the value on success
    ///
    /// # Errors
    ///
    /// Returns every collected error when the result failed.
    pub fn into_result(self) -> Result<Option<String>, Vec<ValidationError>> {
        if self.success {
            Ok(self.value)
        } else {
            Err(self.errors)
        }
    }
}

/// Combines results, collecting every success or every error
///
/// # Errors
///
/// Returns the concatenation of all inputs' errors, in input order, when any
/// input failed.
pub fn combine<T, E>(results: impl IntoIterator<Item = Result<T, Vec<E>>>) -> Result<Vec<T>, Vec<E>> {
    let mut values = Vec::new();
    let mut errors = Vec::new();
    let mut failed = false;
    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(errs) => {
                failed = true;
                errors.extend(errs);
            }
        }
    }
    if failed { Err(errors) } else { Ok(values) }
}

/// Applies `f` to every item and combines the outcomes
///
/// Items are awaited together in batches of `batch_size`; batches run one
/// after another. Output order always matches input order.
///
/// # Errors
///
/// Returns every error produced by any item, in input order.
pub async fn traverse<I, T, E, F, Fut>(
    items: impl IntoIterator<Item = I>,
    batch_size: NonZeroUsize,
    f: F,
) -> Result<Vec<T>, Vec<E>>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T, Vec<E>>>,
{
    combine(traverse_all(items, batch_size, f).await)
}

/// Like [`traverse`] but returns every raw outcome instead of combining them
pub async fn traverse_all<I, O, F, Fut>(
    items: impl IntoIterator<Item = I>,
    batch_size: NonZeroUsize,
    f: F,
) -> Vec<O>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = O>,
{
    let mut items = items.into_iter().peekable();
    let mut outputs = Vec::new();
    while items.peek().is_some() {
        let batch: Vec<Fut> = items.by_ref().take(batch_size.get()).map(&f).collect();
        outputs.extend(join_all(batch).await);
    }
    outputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;
    use pretty_assertions::assert_eq;

    fn err(message: &str) -> ValidationError {
        ValidationError::new(ErrorCode::VarConstraintViolation, message)
    }

    #[test]
    fn test_combine_all_ok() {
        let results: Vec<Result<i32, Vec<String>>> = vec![Ok(1), Ok(2), Ok(3)];
        assert_eq!(combine(results), Ok(vec![1, 2, 3]));
    }

    #[test]
    fn test_combine_keeps_every_error_in_order() {
        let results: Vec<Result<i32, Vec<&str>>> =
            vec![Err(vec!["a", "b"]), Ok(2), Err(vec!["c"])];
        assert_eq!(combine(results), Err(vec!["a", "b", "c"]));
    }

    #[test]
    fn test_combine_failure_without_errors_still_fails() {
        let results: Vec<Result<i32, Vec<&str>>> = vec![Ok(1), Err(Vec::new())];
        assert_eq!(combine(results), Err(Vec::new()));
    }

    #[test]
    fn test_validation_result_combine() {
        let combined = ValidationResult::combine(vec![
            ValidationResult::ok("x"),
            ValidationResult::fail(err("first")),
            ValidationResult::ok("y").with_warning(ValidationError::warning(
                ErrorCode::VarConstraintViolation,
                "careful",
            )),
            ValidationResult::fail_many(vec![err("second"), err("third")]),
        ]);
        assert!(!combined.success);
        let messages: Vec<_> = combined.errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
        assert_eq!(combined.warnings.len(), 1);
        assert_eq!(combined.value, None);
    }

    #[test]
    fn test_validation_result_combine_empty_is_success() {
        assert!(ValidationResult::combine(Vec::new()).success);
    }

    #[test]
    fn test_promote_warnings() {
        let result = ValidationResult::ok("v")
            .with_warning(ValidationError::warning(ErrorCode::VarConstraintViolation, "w"))
            .promote_warnings();
        assert!(!result.success);
        assert_eq!(result.errors[0].severity, Severity::Error);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_promote_warnings_ignores_info() {
        let result = ValidationResult::ok("v")
            .with_warning(
                ValidationError::new(ErrorCode::VarConstraintViolation, "note")
                    .with_severity(Severity::Info),
            )
            .promote_warnings();
        assert!(result.success);
        assert!(result.errors.is_empty());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].message, "note");
    }

    #[test]
    fn test_promote_warnings_keeps_info_beside_promoted_warning() {
        let result = ValidationResult::ok("v")
            .with_warning(
                ValidationError::new(ErrorCode::VarConstraintViolation, "note")
                    .with_severity(Severity::Info),
            )
            .with_warning(ValidationError::warning(ErrorCode::VarConstraintViolation, "w"))
            .promote_warnings();
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].message, "w");
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].severity, Severity::Info);
    }

    #[tokio::test]
    async fn test_traverse_preserves_order_across_batches() {
        let batch = NonZeroUsize::new(2).unwrap();
        let result: Result<Vec<i32>, Vec<String>> =
            traverse(vec![1, 2, 3, 4, 5], batch, |n| async move { Ok(n * 10) }).await;
        assert_eq!(result, Ok(vec![10, 20, 30, 40, 50]));
    }

    #[tokio::test]
    async fn test_traverse_collects_all_failures() {
        let batch = NonZeroUsize::new(3).unwrap();
        let result: Result<Vec<i32>, Vec<String>> = traverse(vec![1, 2, 3, 4], batch, |n| async move {
            if n % 2 == 0 {
                Err(vec![format!("{n} is even")])
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(
            result,
            Err(vec!["2 is even".to_string(), "4 is even".to_string()])
        );
    }
}
