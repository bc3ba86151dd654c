//! Per-execution state threaded through the command chain.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use isorun_core::status::ExecutionStatus;

use super::action::TestAction;
use super::result::TestResult;

/// Shared run status; only ever moves forward until [`StatusFlag::reset`].
#[derive(Debug, Clone, Default)]
pub struct StatusFlag(Arc<AtomicU8>);

impl StatusFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> ExecutionStatus {
        ExecutionStatus::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Raise the status to at least `status`.
    pub fn request(&self, status: ExecutionStatus) {
        self.0.fetch_max(status.as_u8(), Ordering::SeqCst);
    }

    /// Back to `Running`, for the start of a new run.
    pub fn reset(&self) {
        self.0.store(ExecutionStatus::Running.as_u8(), Ordering::SeqCst);
    }

    pub fn is_abort_requested(&self) -> bool {
        self.get() == ExecutionStatus::AbortRequested
    }

    /// True for both stop and abort.
    pub fn is_stop_requested(&self) -> bool {
        self.get() >= ExecutionStatus::StopRequested
    }
}

/// What a command sees while it executes.
#[derive(Clone)]
pub struct ExecutionContext {
    pub current_result: TestResult,
    /// Actions inherited from enclosing suites, outermost first.
    pub upstream_actions: Vec<Arc<dyn TestAction>>,
    pub status: StatusFlag,
    pub stop_on_error: bool,
}

impl ExecutionContext {
    pub fn new(status: StatusFlag) -> Self {
        Self {
            current_result: TestResult::default(),
            upstream_actions: Vec::new(),
            status,
            stop_on_error: false,
        }
    }

    /// Context for the children of a suite: same status, more upstream actions.
    pub fn child(&self, extra: impl IntoIterator<Item = Arc<dyn TestAction>>) -> Self {
        let mut upstream_actions = self.upstream_actions.clone();
        upstream_actions.extend(extra);
        Self {
            current_result: TestResult::default(),
            upstream_actions,
            status: self.status.clone(),
            stop_on_error: self.stop_on_error,
        }
    }
}
