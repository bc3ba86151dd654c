//! CLI module for the isolated test runner
//!
//! This module provides the command-line interface for driving a test package through an agent.
//!
//! ## Commands
//!
//! - `explore <MANIFEST>` - Print the test tree an agent sees for a package
//! - `run <MANIFEST>` - Load the package in an agent, run it and report
//!
//! ## Modules
//!
//! - `commands` - Command implementations
//! - `reporter` - Console progress output
//!
//! ## Design
//!
//! The CLI uses clap for argument parsing with derive macros.
//! Command functions return `CliResult<T>` instead of calling `process::exit`.
//! Only the top-level `run()` function handles errors and exits.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod commands;
pub mod reporter;

use std::fmt;
use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);
}

/// Error type for CLI operations.
///
/// Contains a user-facing message and an exit code. The CLI entry point
/// catches these errors, prints the message, and exits with the code.
#[derive(Debug)]
pub struct CliError {
    /// User-facing error message (already formatted for display)
    pub message: String,
    /// Exit code to return to the shell
    pub exit_code: ExitCode,
}

impl CliError {
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Create a failure error (exit code 1).
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::FAILURE)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Clap CLI definition
// ============================================================================

/// Run test packages inside isolated agent processes
#[derive(Parser, Debug)]
#[command(name = "isorun")]
#[command(version = VERSION)]
#[command(about = "Run test packages inside isolated agent processes", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the tests an agent discovers in a package
    Explore {
        /// Package manifest (JSON)
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,
        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Load a package in an agent and run its tests
    Run(RunArgs),
}

/// Options that shape how the agent is acquired.
#[derive(Args, Debug, Clone, Default)]
pub struct EngineArgs {
    /// Execution target, e.g. `native` or `native-0.1.0`
    #[arg(long, value_name = "TARGET")]
    pub runtime: Option<String>,

    /// Milliseconds to wait for an agent to come up
    #[arg(long, value_name = "MS")]
    pub timeout: Option<u64>,

    /// Start the agent with debug logging
    #[arg(long = "agent-debug")]
    pub agent_debug: bool,

    /// Host the runner inside this process instead of an agent
    #[arg(long)]
    pub inprocess: bool,

    /// Override a package setting
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub settings: Vec<(String, String)>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Package manifest (JSON)
    #[arg(value_name = "MANIFEST")]
    pub manifest: PathBuf,

    #[command(flatten)]
    pub engine: EngineArgs,

    /// Only run tests whose full name contains this keyword
    #[arg(short = 'k', value_name = "KEYWORD")]
    pub keyword: Option<String>,

    /// Only run tests in one of these categories
    #[arg(long = "category", value_name = "CATEGORY")]
    pub categories: Vec<String>,

    /// Skip tests in these categories
    #[arg(long = "exclude-category", value_name = "CATEGORY")]
    pub excluded: Vec<String>,

    /// Stop on first failure
    #[arg(short = 'x', long = "exitfirst")]
    pub stop_on_error: bool,

    /// Write the full result tree as JSON
    #[arg(long = "result", value_name = "FILE")]
    pub result_file: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called. All command
/// implementations return `CliResult` and errors are handled here.
pub fn run() {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

/// Execute the CLI command and return result.
fn execute(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Command::Explore { manifest, engine } => commands::explore(&manifest, &engine),
        Command::Run(args) => commands::run_package(&args),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_explore() {
        let cli = Cli::try_parse_from(["isorun", "explore", "smoke.json", "--inprocess"]).unwrap();
        if let Command::Explore { manifest, engine } = cli.command {
            assert_eq!(manifest, PathBuf::from("smoke.json"));
            assert!(engine.inprocess);
        } else {
            panic!("Expected Explore command");
        }
    }

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::try_parse_from([
            "isorun",
            "run",
            "smoke.json",
            "-v",
            "-x",
            "-k",
            "login",
            "--category",
            "fast",
            "--category",
            "db",
            "--exclude-category",
            "flaky",
            "--result",
            "out.json",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("Expected Run command");
        };
        assert!(args.verbose);
        assert!(args.stop_on_error);
        assert_eq!(args.keyword.as_deref(), Some("login"));
        assert_eq!(args.categories, vec!["fast", "db"]);
        assert_eq!(args.excluded, vec!["flaky"]);
        assert_eq!(args.result_file, Some(PathBuf::from("out.json")));
    }

    #[test]
    fn test_cli_parse_engine_flags() {
        let cli = Cli::try_parse_from([
            "isorun",
            "run",
            "smoke.json",
            "--runtime",
            "native-0.1.0",
            "--timeout",
            "500",
            "--agent-debug",
            "--set",
            "StopOnError=true",
            "--set",
            "WorkDirectory=/tmp/a=b",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("Expected Run command");
        };
        assert_eq!(args.engine.runtime.as_deref(), Some("native-0.1.0"));
        assert_eq!(args.engine.timeout, Some(500));
        assert!(args.engine.agent_debug);
        assert_eq!(
            args.engine.settings,
            vec![
                ("StopOnError".to_string(), "true".to_string()),
                ("WorkDirectory".to_string(), "/tmp/a=b".to_string()),
            ]
        );
    }

    #[test]
    fn test_cli_rejects_malformed_setting() {
        assert!(Cli::try_parse_from(["isorun", "run", "smoke.json", "--set", "novalue"]).is_err());
        assert!(Cli::try_parse_from(["isorun", "run", "smoke.json", "--set", "=x"]).is_err());
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["isorun"]).is_err());
    }
}
