//! The command chain.
//!
//! Every test runs through a chain of commands: a leaf that does the work and decorators that each
//! hold exactly one inner command. A decorator may run code before and after delegating, or replace
//! the outcome its inner command produced.

use isorun_core::ResultState;
use thiserror::Error;

use super::context::ExecutionContext;
use super::process::ProcessLauncher;
use super::result::{TestFailure, TestResult};
use super::test::Test;

/// Errors raised while assembling a chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("'{0}' is not a test method")]
    NotATestMethod(String),
}

/// One link of the chain.
pub trait TestCommand: Send {
    /// The test this chain executes.
    fn test(&self) -> &Test;

    /// Short label, used in logs and diagnostics.
    fn name(&self) -> &'static str;

    /// The wrapped command; `None` for a leaf.
    fn inner(&self) -> Option<&dyn TestCommand> {
        None
    }

    fn execute(&self, context: &mut ExecutionContext) -> Result<TestResult, TestFailure>;
}

/// Names from the outermost command down to the leaf.
pub fn chain_names(command: &dyn TestCommand) -> Vec<&'static str> {
    let mut names = vec![command.name()];
    let mut next = command.inner();
    while let Some(cmd) = next {
        names.push(cmd.name());
        next = cmd.inner();
    }
    names
}

// ============================================================================
// Leaf
// ============================================================================

/// Runs a test method's argv; exit status 0 passes.
pub struct ProcessTestCommand {
    test: Test,
    launcher: ProcessLauncher,
}

impl ProcessTestCommand {
    pub fn new(test: Test, launcher: ProcessLauncher) -> Self {
        Self { test, launcher }
    }
}

impl TestCommand for ProcessTestCommand {
    fn test(&self) -> &Test {
        &self.test
    }

    fn name(&self) -> &'static str {
        "process"
    }

    fn execute(&self, _context: &mut ExecutionContext) -> Result<TestResult, TestFailure> {
        let env = [("ISORUN_TEST_NAME", self.test.full_name.as_str())];
        let outcome = self.launcher.run(&self.test.command, &env, self.test.timeout)?;

        let mut result = TestResult::new(&self.test);
        result.duration = outcome.duration;
        if outcome.success() {
            result.set_result(ResultState::Passed, None);
        } else {
            result.set_result(ResultState::Failed, Some(outcome.failure_summary()));
        }
        result.output = outcome.stdout;
        Ok(result)
    }
}

// ============================================================================
// Decorators
// ============================================================================

/// Fails a passing test that ran longer than its declared maximum.
pub struct MaxTimeCommand {
    inner: Box<dyn TestCommand>,
}

impl MaxTimeCommand {
    pub fn new(inner: Box<dyn TestCommand>) -> Self {
        Self { inner }
    }
}

impl TestCommand for MaxTimeCommand {
    fn test(&self) -> &Test {
        self.inner.test()
    }

    fn name(&self) -> &'static str {
        "max_time"
    }

    fn inner(&self) -> Option<&dyn TestCommand> {
        Some(self.inner.as_ref())
    }

    fn execute(&self, context: &mut ExecutionContext) -> Result<TestResult, TestFailure> {
        let mut result = self.inner.execute(context)?;
        let Some(limit) = self.test().max_time else {
            return Ok(result);
        };
        if result.state == ResultState::Passed && result.duration > limit {
            result.set_result(
                ResultState::Failed,
                Some(format!(
                    "elapsed time of {} ms exceeds maximum of {} ms",
                    result.duration.as_millis(),
                    limit.as_millis()
                )),
            );
        }
        Ok(result)
    }
}

/// Runs the inner command up to `count` times, stopping at the first result that did not pass.
pub struct RepeatedTestCommand {
    inner: Box<dyn TestCommand>,
    count: u32,
}

impl RepeatedTestCommand {
    pub fn new(inner: Box<dyn TestCommand>, count: u32) -> Self {
        Self { inner, count }
    }
}

impl TestCommand for RepeatedTestCommand {
    fn test(&self) -> &Test {
        self.inner.test()
    }

    fn name(&self) -> &'static str {
        "repeat"
    }

    fn inner(&self) -> Option<&dyn TestCommand> {
        Some(self.inner.as_ref())
    }

    fn execute(&self, context: &mut ExecutionContext) -> Result<TestResult, TestFailure> {
        let mut last = None;
        let mut completed = 0;
        for _ in 0..self.count {
            context.current_result = TestResult::new(self.test());
            let result = self.inner.execute(context)?;
            completed += 1;
            let passed = result.state == ResultState::Passed;
            last = Some(result);
            if !passed || context.status.is_stop_requested() {
                break;
            }
        }
        let mut result = last.unwrap_or_else(|| TestResult::new(self.test()));
        result.repeat_count = completed;
        Ok(result)
    }
}
