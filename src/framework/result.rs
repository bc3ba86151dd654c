//! Test outcomes.
//!
//! Failures during execution are values: commands return [`TestFailure`] and the action pipeline
//! records it into the [`TestResult`] instead of propagating it.

use std::time::Duration;

use isorun_core::ResultState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::test::{Test, TestKind};

/// Why a command did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TestFailure {
    /// Infrastructure failure: launch error, hook error.
    #[error("{0}")]
    Error(String),
    /// The test itself reported failure.
    #[error("{0}")]
    Assertion(String),
    /// The hard timeout fired; the value is the limit in milliseconds.
    #[error("test exceeded its timeout of {0} ms")]
    Timeout(u64),
    /// The run is being aborted.
    #[error("test run was cancelled")]
    Cancelled,
}

/// Outcome of a test or suite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub id: String,
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub kind: TestKind,
    #[serde(default)]
    pub state: ResultState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,
    #[serde(default)]
    pub duration: Duration,
    /// Completed iterations of a repeated test.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub repeat_count: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TestResult>,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

/// Per-state tally of test methods in a result tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultCounts {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub cancelled: usize,
    pub skipped: usize,
    pub inconclusive: usize,
}

impl TestResult {
    /// A fresh, inconclusive result for `test`.
    pub fn new(test: &Test) -> Self {
        Self {
            id: test.id.clone(),
            name: test.name.clone(),
            full_name: test.full_name.clone(),
            kind: test.kind,
            ..Self::default()
        }
    }

    pub fn set_result(&mut self, state: ResultState, message: Option<String>) {
        self.state = state;
        self.message = message;
    }

    /// Record a failure raised while the test was running.
    pub fn record_failure(&mut self, failure: &TestFailure) {
        let state = match failure {
            TestFailure::Error(_) => ResultState::Error,
            TestFailure::Assertion(_) | TestFailure::Timeout(_) => ResultState::Failed,
            TestFailure::Cancelled => ResultState::Cancelled,
        };
        self.set_result(state, Some(failure.to_string()));
    }

    /// Record a failure raised by cleanup after the outcome was known.
    ///
    /// A passing test becomes an error; an existing failure keeps its state and gains the message.
    pub fn record_teardown_failure(&mut self, failure: &TestFailure) {
        if !self.state.is_failure() {
            self.state = ResultState::Error;
        }
        let line = format!("teardown: {failure}");
        self.message = Some(match self.message.take() {
            Some(existing) => format!("{existing}\n{line}"),
            None => line,
        });
    }

    pub fn add_child(&mut self, child: TestResult) {
        self.children.push(child);
    }

    /// Fold child outcomes into this (suite) result; the most severe state wins.
    pub fn roll_up(&mut self) {
        let worst = self
            .children
            .iter()
            .map(|c| c.state)
            .max_by_key(|s| s.severity());
        if let Some(worst) = worst.filter(|w| w.severity() > self.state.severity()) {
            self.state = worst;
        }
    }

    pub fn counts(&self) -> ResultCounts {
        let mut counts = ResultCounts::default();
        self.tally(&mut counts);
        counts
    }

    fn tally(&self, counts: &mut ResultCounts) {
        if self.kind == TestKind::Suite {
            for child in &self.children {
                child.tally(counts);
            }
            return;
        }
        counts.total += 1;
        match self.state {
            ResultState::Passed => counts.passed += 1,
            ResultState::Failed => counts.failed += 1,
            ResultState::Error => counts.errors += 1,
            ResultState::Cancelled => counts.cancelled += 1,
            ResultState::Skipped => counts.skipped += 1,
            ResultState::Inconclusive => counts.inconclusive += 1,
        }
    }

    /// Whether this result or anything below it failed.
    pub fn has_failures(&self) -> bool {
        self.state.is_failure() || self.children.iter().any(TestResult::has_failures)
    }

    /// Failed results in tree order, suites included when they failed on their own.
    pub fn failures(&self) -> Vec<&TestResult> {
        let mut out = Vec::new();
        self.collect_failures(&mut out);
        out
    }

    fn collect_failures<'a>(&'a self, out: &mut Vec<&'a TestResult>) {
        let own_failure = match self.kind {
            TestKind::Method => self.state.is_failure(),
            TestKind::Suite => self.message.is_some() && self.state.is_failure(),
        };
        if own_failure {
            out.push(self);
        }
        for child in &self.children {
            child.collect_failures(out);
        }
    }
}
