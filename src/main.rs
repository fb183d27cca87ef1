//! envpipe - Resolve and validate pipe-syntax environment templates
//!
//! ## Commands
//!
//! - `envpipe check` - Resolve a template and report every problem
//! - `envpipe plugins` - List the validators and transformers available
//! - `envpipe completions` - Generate shell completions
//!
//! ## Quick Start
//!
//! ```bash
//! # Resolve a template, supplying values on the command line
//! envpipe check env.yaml --set API_KEY=secret --set PORT=8080
//!
//! # Fail on warnings too, and print JSON
//! envpipe check env.yaml --strict --format json
//!
//! # Generate shell completions
//! envpipe completions bash > /etc/bash_completion.d/envpipe
//! ```
//!
//! Set `ENVPIPE_LOG=debug` for detailed logs on stderr.

use std::process::ExitCode;

mod cli;

fn main() -> ExitCode {
    match cli::run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
