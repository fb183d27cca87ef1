//! Infrastructure layer
//!
//! Configuration loading and logging setup used by the binary.

mod config;
mod logging;

pub use config::{Config, ConfigError};
pub use logging::{LOG_ENV, init_logging, log_filter};
