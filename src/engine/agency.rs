//! Agents and the agency that hands them out.
//!
//! An agent is a worker able to host a [`TestRunner`] for one execution target. The
//! [`ProcessAgency`] starts one `isorun-agent` process per request and waits (bounded) for its
//! handshake before handing it out.

use std::env;
use std::ffi::OsString;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use super::error::EngineError;
use super::protocol::{self, Response};
use super::remote::{AgentChannel, RemoteRunner};
use super::runner::TestRunner;
use super::target::ExecutionTarget;

/// Overrides the agent executable.
pub const AGENT_PATH_ENV: &str = "ISORUN_AGENT_PATH";

const AGENT_BINARY: &str = "isorun-agent";

// ============================================================================
// Traits
// ============================================================================

/// A worker that can host a runner.
pub trait TestAgent: Send {
    fn id(&self) -> &str;

    fn target(&self) -> &ExecutionTarget;

    /// Obtain a runner living in this agent.
    fn create_runner(&mut self) -> Result<Box<dyn TestRunner>, EngineError>;

    /// Stop the worker. Stopping a stopped agent is a no-op.
    fn stop(&mut self) -> Result<(), EngineError>;

    fn is_stopped(&self) -> bool;
}

/// Hands out agents for execution targets.
pub trait TestAgency: Send {
    /// Acquire an agent for `target`, waiting at most `timeout`.
    ///
    /// ## Errors
    ///
    /// [`EngineError::AgentUnavailable`] when no matching agent is ready in time.
    fn get_agent(
        &self,
        target: &ExecutionTarget,
        timeout: Duration,
        debug: bool,
    ) -> Result<Box<dyn TestAgent>, EngineError>;

    /// Give an agent back. The default stops it; failures are logged, not returned.
    fn release(&self, agent: &mut dyn TestAgent) {
        if let Err(e) = agent.stop() {
            tracing::warn!(agent = agent.id(), error = %e, "failed to stop agent");
        }
    }
}

// ============================================================================
// Agent command
// ============================================================================

/// Program and leading arguments used to start an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCommand {
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl AgentCommand {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// `ISORUN_AGENT_PATH`, else `isorun-agent` next to the current executable, else `PATH`.
    pub fn resolve() -> Self {
        if let Some(path) = env::var_os(AGENT_PATH_ENV).filter(|p| !p.is_empty()) {
            return Self::new(path);
        }
        let name = format!("{AGENT_BINARY}{}", env::consts::EXE_SUFFIX);
        if let Some(found) = env::current_exe().ok().and_then(|exe| sibling(&exe, &name)) {
            return Self::new(found);
        }
        Self::new(name)
    }
}

/// Look beside `exe`, and one level up for binaries living in cargo's `deps/`.
fn sibling(exe: &Path, name: &str) -> Option<PathBuf> {
    let dir = exe.parent()?;
    [Some(dir), dir.parent()]
        .into_iter()
        .flatten()
        .map(|d| d.join(name))
        .find(|candidate| candidate.is_file())
}

// ============================================================================
// Process agency
// ============================================================================

/// Starts a fresh agent process per request.
#[derive(Debug, Clone)]
pub struct ProcessAgency {
    command: AgentCommand,
}

impl ProcessAgency {
    pub fn new(command: AgentCommand) -> Self {
        Self { command }
    }

    pub fn command(&self) -> &AgentCommand {
        &self.command
    }
}

impl Default for ProcessAgency {
    fn default() -> Self {
        Self::new(AgentCommand::resolve())
    }
}

impl TestAgency for ProcessAgency {
    fn get_agent(
        &self,
        target: &ExecutionTarget,
        timeout: Duration,
        debug: bool,
    ) -> Result<Box<dyn TestAgent>, EngineError> {
        let program = self.command.program.to_string_lossy().into_owned();
        tracing::debug!(%program, %target, timeout_ms = timeout.as_millis() as u64, "starting agent");

        let mut command = Command::new(&self.command.program);
        command.args(&self.command.args).arg("--runtime").arg(target.to_string());
        if debug {
            command.arg("--debug");
        }
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        // Keep terminal Ctrl-C away from the agent; the controller forwards it as a stop request.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command
            .spawn()
            .map_err(|e| EngineError::unavailable(target, format!("failed to start '{program}': {e}")))?;

        let pipes = child.stdin.take().zip(child.stdout.take());
        let Some((stdin, stdout)) = pipes else {
            kill(&mut child);
            return Err(EngineError::unavailable(target, "agent pipes were not captured"));
        };

        let (tx, rx) = mpsc::channel();
        let reader = thread::Builder::new()
            .name("isorun-agent-reader".to_string())
            .spawn(move || pump_lines(stdout, tx));
        if let Err(e) = reader {
            kill(&mut child);
            return Err(EngineError::unavailable(target, format!("failed to start reader thread: {e}")));
        }

        let hello = match wait_for_hello(&rx, timeout) {
            Ok(hello) => hello,
            Err(reason) => {
                kill(&mut child);
                return Err(EngineError::unavailable(target, reason));
            }
        };
        if !target.matches(&hello.runtime, &hello.version) {
            kill(&mut child);
            return Err(EngineError::unavailable(
                target,
                format!("agent reported {}-{}", hello.runtime, hello.version),
            ));
        }

        let id = format!("agent-{}", hello.pid);
        tracing::info!(agent = %id, %target, "agent ready");
        let channel = Arc::new(AgentChannel::new(stdin, rx, child));
        Ok(Box::new(ProcessAgent {
            id,
            target: target.clone(),
            channel,
            stopped: false,
        }))
    }
}

/// The handshake an agent sends before anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub runtime: String,
    pub version: String,
    pub pid: u32,
}

/// Wait for the first message on `rx` to be a hello, for at most `timeout`.
///
/// Blank lines do not count as messages. The error is a human-readable reason.
pub fn wait_for_hello(rx: &Receiver<String>, timeout: Duration) -> Result<Hello, String> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let line = match rx.recv_timeout(remaining) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => {
                return Err(format!("no handshake within {} ms", timeout.as_millis()));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err("agent exited before completing the handshake".to_string());
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        return match protocol::decode::<Response>(&line) {
            Ok(Response::Hello { runtime, version, pid }) => Ok(Hello { runtime, version, pid }),
            Ok(other) => Err(format!("expected hello, got '{}'", other.kind())),
            Err(e) => Err(format!("malformed handshake: {e}")),
        };
    }
}

/// Forward stdout lines until EOF or until nobody listens.
fn pump_lines(stdout: ChildStdout, tx: Sender<String>) {
    for line in BufReader::new(stdout).lines() {
        let Ok(line) = line else { break };
        if tx.send(line).is_err() {
            break;
        }
    }
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        tracing::debug!(error = %e, "agent already gone");
    }
    let _ = child.wait();
}

/// An agent living in a child process.
pub struct ProcessAgent {
    id: String,
    target: ExecutionTarget,
    channel: Arc<AgentChannel>,
    stopped: bool,
}

impl TestAgent for ProcessAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn target(&self) -> &ExecutionTarget {
        &self.target
    }

    fn create_runner(&mut self) -> Result<Box<dyn TestRunner>, EngineError> {
        if self.stopped {
            return Err(EngineError::unavailable(&self.target, format!("{} has been stopped", self.id)));
        }
        Ok(Box::new(RemoteRunner::new(Arc::clone(&self.channel))))
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        tracing::debug!(agent = %self.id, "stopping agent");
        self.channel.shutdown()
    }

    fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl Drop for ProcessAgent {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(agent = %self.id, error = %e, "failed to stop agent on drop");
        }
    }
}
