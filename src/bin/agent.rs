//! isorun agent binary entry point
//!
//! Run with: isorun-agent --runtime <target> [--debug]
//!
//! Speaks the isorun protocol on stdin/stdout; logs go to stderr.

use clap::Parser;
use isorun::agent::{LocalTestRunner, serve_stdio};
use isorun::engine::target::{AGENT_VERSION, ExecutionTarget};
use isorun_core::settings::NATIVE_RUNTIME;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "isorun-agent", version, about = "Hosts isorun test runs in an isolated process")]
struct AgentArgs {
    /// Execution target requested by the controller
    #[arg(long, default_value = "current")]
    runtime: String,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long)]
    debug: bool,
}

fn main() {
    let args = AgentArgs::parse();

    let default_level = if args.debug { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .try_init();

    let requested = ExecutionTarget::parse(&args.runtime);
    if !requested.matches(NATIVE_RUNTIME, AGENT_VERSION) {
        // Still say hello with the real identity; the controller decides.
        tracing::warn!(%requested, "agent cannot serve the requested target");
    }

    let runner = match LocalTestRunner::new() {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("isorun-agent: {e}");
            std::process::exit(2);
        }
    };

    if let Err(e) = serve_stdio(runner) {
        tracing::error!(error = %e, "agent terminated");
        std::process::exit(1);
    }
}
