//! Resolution engine
//!
//! The orchestrator drives every variable through parse, ordering,
//! validation and transformation. Plugin calls go through [`guarded`], which
//! turns a panic or an overrun into an ordinary error for that variable.

mod orchestrator;
mod transform;
mod validation;

pub use orchestrator::{ResolveOptions, ResolvedVariable, ResolvedVariables, Resolver, run};
pub use transform::TransformPipeline;
pub use validation::ValidationPipeline;

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::warn;

use crate::errors::{ErrorCode, ValidationError};

/// Awaits a plugin call under `limit`, catching panics
///
/// A panic becomes a `panic_code` error and an overrun a
/// `PLUGIN_EXECUTION_TIMEOUT` error, both naming `plugin`.
pub(crate) async fn guarded<T>(
    call: impl Future<Output = T>,
    limit: Duration,
    plugin: &str,
    panic_code: ErrorCode,
) -> Result<T, ValidationError> {
    match tokio::time::timeout(limit, AssertUnwindSafe(call).catch_unwind()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(payload)) => {
            let reason = panic_message(payload.as_ref());
            warn!(plugin, %reason, "plugin panicked");
            Err(ValidationError::new(
                panic_code,
                format!("plugin '{plugin}' failed: {reason}"),
            ))
        }
        Err(_) => {
            warn!(plugin, ?limit, "plugin timed out");
            Err(ValidationError::new(
                ErrorCode::PluginExecutionTimeout,
                format!("plugin '{plugin}' did not finish within {}ms", limit.as_millis()),
            )
            .with_expected(format!("<= {}ms", limit.as_millis())))
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panicked".to_string()
    }
}
