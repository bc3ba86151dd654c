//! Property-based tests for the action pipeline
//!
//! These tests use proptest to check the hook ordering guarantees across
//! arbitrary action lists and failure points.

use std::sync::{Arc, Mutex};

use isorun::framework::action::{ActionCommand, ActionProvider, TestAction};
use isorun::framework::command::TestCommand;
use isorun::framework::context::{ExecutionContext, StatusFlag};
use isorun::framework::result::{TestFailure, TestResult};
use isorun::framework::test::Test;
use isorun_core::{ActionTargets, ExecutionStatus, ResultState};
use proptest::prelude::*;

type Log = Arc<Mutex<Vec<String>>>;

struct Hook {
    index: usize,
    fails_before: bool,
    log: Log,
}

impl TestAction for Hook {
    fn name(&self) -> &str {
        "hook"
    }

    fn targets(&self) -> ActionTargets {
        ActionTargets::Test
    }

    fn before_test(&self, _test: &Test) -> Result<(), TestFailure> {
        self.log.lock().unwrap().push(format!("before {}", self.index));
        if self.fails_before {
            return Err(TestFailure::Error(format!("hook {} failed", self.index)));
        }
        Ok(())
    }

    fn after_test(&self, _test: &Test) -> Result<(), TestFailure> {
        self.log.lock().unwrap().push(format!("after {}", self.index));
        Ok(())
    }
}

struct Hooks(Vec<Arc<dyn TestAction>>);

impl ActionProvider for Hooks {
    fn actions_for(&self, _test: &Test) -> Vec<Arc<dyn TestAction>> {
        self.0.clone()
    }
}

/// Inner command; passes, or requests an abort and reports itself cancelled.
struct Leaf {
    test: Test,
    aborts: bool,
    log: Log,
}

impl TestCommand for Leaf {
    fn test(&self) -> &Test {
        &self.test
    }

    fn name(&self) -> &'static str {
        "leaf"
    }

    fn execute(&self, context: &mut ExecutionContext) -> Result<TestResult, TestFailure> {
        self.log.lock().unwrap().push("run".to_string());
        if self.aborts {
            context.status.request(ExecutionStatus::AbortRequested);
            return Err(TestFailure::Cancelled);
        }
        let mut result = TestResult::new(&self.test);
        result.set_result(ResultState::Passed, None);
        Ok(result)
    }
}

/// Run a pipeline of `count` hooks where hook `failing` (if any) fails its before-hook.
fn run_pipeline(count: usize, failing: Option<usize>) -> (TestResult, Vec<String>) {
    run_pipeline_with(count, failing, false)
}

fn run_pipeline_with(count: usize, failing: Option<usize>, aborts: bool) -> (TestResult, Vec<String>) {
    let log: Log = Arc::default();
    let hooks = (0..count)
        .map(|index| {
            Arc::new(Hook {
                index,
                fails_before: failing == Some(index),
                log: log.clone(),
            }) as Arc<dyn TestAction>
        })
        .collect();
    let leaf = Leaf {
        test: Test::method("t", &["true"]),
        aborts,
        log: log.clone(),
    };
    let command = ActionCommand::new(Box::new(leaf), Arc::new(Hooks(hooks))).unwrap();
    let result = command
        .execute(&mut ExecutionContext::new(StatusFlag::new()))
        .unwrap();
    let entries = log.lock().unwrap().clone();
    (result, entries)
}

proptest! {
    /// Property: after-hooks mirror before-hooks exactly, in reverse.
    #[test]
    fn cleanup_runs_in_reverse_order(count in 0usize..10) {
        let (result, log) = run_pipeline(count, None);

        let mut expected: Vec<String> = (0..count).map(|i| format!("before {i}")).collect();
        expected.push("run".to_string());
        expected.extend((0..count).rev().map(|i| format!("after {i}")));

        prop_assert_eq!(result.state, ResultState::Passed);
        prop_assert_eq!(log, expected);
    }

    /// Property: a failing before-hook stops the pipeline, and only attempted items are unwound.
    #[test]
    fn only_started_items_are_unwound((count, failing) in (1usize..10).prop_flat_map(|n| (Just(n), 0..n))) {
        let (result, log) = run_pipeline(count, Some(failing));

        let mut expected: Vec<String> = (0..=failing).map(|i| format!("before {i}")).collect();
        expected.extend((0..=failing).rev().map(|i| format!("after {i}")));

        prop_assert_eq!(result.state, ResultState::Error);
        prop_assert_eq!(result.message, Some(format!("hook {failing} failed")));
        prop_assert_eq!(log, expected);
    }

    /// Property: an abort raised by the test itself skips every after-hook, however many started.
    #[test]
    fn abort_inside_the_test_suppresses_all_cleanup(count in 2usize..10) {
        let (result, log) = run_pipeline_with(count, None, true);

        let mut expected: Vec<String> = (0..count).map(|i| format!("before {i}")).collect();
        expected.push("run".to_string());

        prop_assert_eq!(result.state, ResultState::Cancelled);
        prop_assert!(!log.iter().any(|entry| entry.starts_with("after")));
        prop_assert_eq!(log, expected);
    }
}
