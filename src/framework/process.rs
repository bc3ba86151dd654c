//! Launching test and hook processes.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::runtime::Handle;

use super::result::TestFailure;

/// Lines of output kept in a failure message.
const TAIL_LINES: usize = 20;

/// Runs argv commands in a working directory on a tokio runtime.
///
/// Callers must not already be inside that runtime: `run` blocks on it.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    runtime: Handle,
    work_dir: PathBuf,
}

/// Captured result of one process.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Human-readable exit description plus the tail of the output.
    pub fn failure_summary(&self) -> String {
        let mut message = match self.status.code() {
            Some(code) => format!("exited with status {code}"),
            None => "terminated by signal".to_string(),
        };
        let tail = tail(if self.stderr.trim().is_empty() { &self.stdout } else { &self.stderr });
        if !tail.is_empty() {
            message.push('\n');
            message.push_str(&tail);
        }
        message
    }
}

fn tail(text: &str) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(TAIL_LINES);
    lines[start..].join("\n")
}

impl ProcessLauncher {
    pub fn new(runtime: Handle, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Run `argv` to completion, killing it if `timeout` elapses.
    ///
    /// ## Errors
    ///
    /// - [`TestFailure::Error`] when the command is empty or cannot be started.
    /// - [`TestFailure::Timeout`] when the limit elapsed; the child is killed.
    pub fn run(
        &self,
        argv: &[String],
        env: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> Result<ProcessOutcome, TestFailure> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| TestFailure::Error("empty command".to_string()))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in env {
            command.env(key, value);
        }

        let started = Instant::now();
        let output = self.runtime.block_on(async {
            let pending = command.output();
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, pending).await {
                    Ok(output) => Ok(output),
                    Err(_) => Err(TestFailure::Timeout(limit.as_millis() as u64)),
                },
                None => Ok(pending.await),
            }
        })?;
        let output = output.map_err(|e| TestFailure::Error(format!("failed to launch '{program}': {e}")))?;

        Ok(ProcessOutcome {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: started.elapsed(),
        })
    }
}
