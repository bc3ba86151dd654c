//! Result states and execution status.
//!
//! `ResultState` is the outcome recorded for a test or suite. `ExecutionStatus` is the run-wide
//! cooperative cancellation signal: it only ever moves forward (`Running` → `StopRequested` →
//! `AbortRequested`).

use crate::registry::{self, VocabInfo};

/// Outcome of a test or suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ResultState {
    /// Not run yet, or ran without producing an outcome.
    #[default]
    Inconclusive,
    Passed,
    /// The test ran and reported failure.
    Failed,
    /// Infrastructure failure: a hook, the process launch, or the engine itself failed.
    Error,
    /// Execution was aborted before the outcome was known.
    Cancelled,
    /// Ignored or not started.
    Skipped,
}

/// Metadata entry for a result state.
pub type ResultStateInfo = VocabInfo<ResultState>;

/// Registry of result states.
pub const RESULT_STATES: &[ResultStateInfo] = &[
    state(ResultState::Inconclusive, "inconclusive", "No outcome recorded."),
    state(ResultState::Passed, "passed", "The test succeeded."),
    state(ResultState::Failed, "failed", "The test reported a failure."),
    state(ResultState::Error, "error", "A hook or the test launch failed."),
    state(ResultState::Cancelled, "cancelled", "The run was aborted while the test executed."),
    state(ResultState::Skipped, "skipped", "The test was ignored or not started."),
];

/// Resolve a result state spelling.
pub fn from_str(name: &str) -> Option<ResultState> {
    registry::lookup(RESULT_STATES, name)
}

/// Return the canonical spelling for a result state.
pub fn as_str(id: ResultState) -> &'static str {
    match registry::find(RESULT_STATES, id) {
        Some(info) => info.canonical,
        None => "",
    }
}

impl ResultState {
    /// Whether this outcome counts against the run.
    pub fn is_failure(self) -> bool {
        matches!(self, ResultState::Failed | ResultState::Error | ResultState::Cancelled)
    }

    /// Severity used when rolling child outcomes up into a suite.
    ///
    /// Higher wins; `Skipped` never masks a pass.
    pub fn severity(self) -> u8 {
        match self {
            ResultState::Inconclusive => 0,
            ResultState::Skipped => 1,
            ResultState::Passed => 2,
            ResultState::Failed => 3,
            ResultState::Error => 4,
            ResultState::Cancelled => 5,
        }
    }
}

impl std::fmt::Display for ResultState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(as_str(*self))
    }
}

/// Run-wide execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ExecutionStatus {
    #[default]
    Running,
    /// Finish the current test with full cleanup, start nothing new.
    StopRequested,
    /// Stop as fast as possible; cleanup hooks are skipped.
    AbortRequested,
}

impl ExecutionStatus {
    /// Encode for storage in an atomic.
    pub fn as_u8(self) -> u8 {
        match self {
            ExecutionStatus::Running => 0,
            ExecutionStatus::StopRequested => 1,
            ExecutionStatus::AbortRequested => 2,
        }
    }

    /// Decode from an atomic; out-of-range values saturate to `AbortRequested`.
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ExecutionStatus::Running,
            1 => ExecutionStatus::StopRequested,
            _ => ExecutionStatus::AbortRequested,
        }
    }
}

const fn state(id: ResultState, canonical: &'static str, description: &'static str) -> ResultStateInfo {
    VocabInfo {
        id,
        canonical,
        aliases: &[],
        description,
        since_version: "0.1.0",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_u8() {
        for status in [
            ExecutionStatus::Running,
            ExecutionStatus::StopRequested,
            ExecutionStatus::AbortRequested,
        ] {
            assert_eq!(ExecutionStatus::from_u8(status.as_u8()), status);
        }
        assert_eq!(ExecutionStatus::from_u8(200), ExecutionStatus::AbortRequested);
    }

    #[test]
    fn failure_states() {
        assert!(ResultState::Error.is_failure());
        assert!(!ResultState::Skipped.is_failure());
        assert!(ResultState::Failed.severity() > ResultState::Passed.severity());
    }
}
