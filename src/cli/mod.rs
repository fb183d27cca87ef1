//! CLI for envpipe
//!
//! - `check`: Resolve a template and report every problem
//! - `plugins`: List the validators and transformers available
//! - `completions`: Generate shell completions

pub mod check;
pub mod completions;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use envpipe::infrastructure::{Config, init_logging};
use envpipe::plugins::{CatalogLoader, PluginRegistry};

/// Configuration file picked up from the working directory
const DEFAULT_CONFIG: &str = "envpipe.yaml";

/// CLI arguments for envpipe
#[derive(Parser, Debug)]
#[command(name = "envpipe")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults to ./envpipe.yaml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a template and report every problem
    Check {
        /// Template file to resolve
        file: PathBuf,
        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
        /// Break cycles whose members all have defaults
        #[arg(long)]
        allow_circular: bool,
        /// Supply a value, repeatable
        #[arg(long = "set", value_name = "NAME=VALUE")]
        overrides: Vec<String>,
        /// Only use built-in plugins
        #[arg(long)]
        no_discovery: bool,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List the validators and transformers available
    Plugins {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: ShellArg,
        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ShellArg {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

/// Build the CLI command for completion generation
pub fn build_cli() -> clap::Command {
    Args::command()
}

fn load_config(explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display())),
        None if Path::new(DEFAULT_CONFIG).is_file() => {
            Config::load(Path::new(DEFAULT_CONFIG)).context("Failed to load ./envpipe.yaml")
        }
        None => Ok(Config::default()),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}

/// Parse and execute CLI arguments
pub fn run() -> Result<ExitCode> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    init_logging(if args.verbose { "debug" } else { config.log_level.as_str() });

    match args.command {
        Command::Check {
            file,
            strict,
            allow_circular,
            overrides,
            no_discovery,
            format,
        } => {
            let options = check::CheckOptions {
                strict,
                allow_circular,
                overrides,
                no_discovery,
            };
            let report = runtime()?.block_on(check::check_template(&file, &config, &options))?;
            match format {
                OutputFormat::Text => println!("{}", check::render_text(&report)),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            }
            return Ok(if report.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            });
        }
        Command::Plugins { format } => {
            let mut registry = PluginRegistry::with_builtins();
            let report = runtime()?
                .block_on(registry.discover_configured(&config.plugins, &CatalogLoader::builtin()))
                .context("Plugin discovery failed")?;
            for error in &report.errors {
                eprintln!("warning: {error}");
            }
            let listing = registry.list();
            match format {
                OutputFormat::Text => {
                    println!("validators:   {}", listing.validators.join(", "));
                    println!("transformers: {}", listing.transformers.join(", "));
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&listing)?),
            }
        }
        Command::Completions { shell, output } => {
            use clap_complete::Shell;

            let shell_enum = match shell {
                ShellArg::Bash => Shell::Bash,
                ShellArg::Zsh => Shell::Zsh,
                ShellArg::Fish => Shell::Fish,
                ShellArg::PowerShell => Shell::PowerShell,
            };

            let completions = completions::generate_completions(shell_enum)?;

            if let Some(output_path) = output {
                completions::save_completions(&completions, &output_path)?;
            } else {
                println!("{}", completions);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
