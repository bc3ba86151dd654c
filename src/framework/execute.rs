//! Walking the test tree.

use std::sync::Arc;
use std::time::Instant;

use isorun_core::ResultState;
use isorun_core::status::ExecutionStatus;

use super::action::{ActionCommand, ActionProvider, SuiteActionScope};
use super::command::{CommandError, MaxTimeCommand, ProcessTestCommand, RepeatedTestCommand, TestCommand};
use super::context::ExecutionContext;
use super::process::ProcessLauncher;
use super::result::{TestFailure, TestResult};
use super::test::{Test, TestKind};
use crate::engine::events::{TestEvent, TestEventHandler};
use crate::engine::filter::TestFilter;

/// Assemble the command chain for a test method.
///
/// Process leaf, then the action pipeline, then max-time and repeat when the test declares them.
pub fn build_chain(
    test: &Test,
    launcher: &ProcessLauncher,
    provider: Arc<dyn ActionProvider>,
) -> Result<Box<dyn TestCommand>, CommandError> {
    let leaf: Box<dyn TestCommand> = Box::new(ProcessTestCommand::new(test.clone(), launcher.clone()));
    let mut command: Box<dyn TestCommand> = Box::new(ActionCommand::new(leaf, provider)?);
    if test.max_time.is_some() {
        command = Box::new(MaxTimeCommand::new(command));
    }
    if let Some(count) = test.repeat.filter(|n| *n > 1) {
        command = Box::new(RepeatedTestCommand::new(command, count));
    }
    Ok(command)
}

/// Executes a test tree depth-first, emitting events as it goes.
pub struct SuiteRunner<'a> {
    launcher: ProcessLauncher,
    provider: Arc<dyn ActionProvider>,
    filter: &'a TestFilter,
    handler: &'a mut dyn TestEventHandler,
}

impl<'a> SuiteRunner<'a> {
    pub fn new(
        launcher: ProcessLauncher,
        provider: Arc<dyn ActionProvider>,
        filter: &'a TestFilter,
        handler: &'a mut dyn TestEventHandler,
    ) -> Self {
        Self {
            launcher,
            provider,
            filter,
            handler,
        }
    }

    /// Run everything under `root` the filter selects.
    pub fn run(&mut self, root: &Test, context: &mut ExecutionContext) -> TestResult {
        let test_count = self.selected_count(root);
        self.handler.on_event(&TestEvent::RunStarted { test_count });
        let result = if self.is_selected(root) {
            self.run_node(root, context)
        } else {
            TestResult::new(root)
        };
        self.handler.on_event(&TestEvent::RunFinished);
        result
    }

    fn is_selected(&self, test: &Test) -> bool {
        match test.kind {
            TestKind::Method => self.filter.pass(&test.full_name, &test.categories),
            TestKind::Suite => test.children.iter().any(|c| self.is_selected(c)),
        }
    }

    fn selected_children<'t>(&self, suite: &'t Test) -> Vec<&'t Test> {
        suite.children.iter().filter(|c| self.is_selected(c)).collect()
    }

    fn selected_count(&self, test: &Test) -> usize {
        match test.kind {
            TestKind::Method => usize::from(self.is_selected(test)),
            TestKind::Suite => test.children.iter().map(|c| self.selected_count(c)).sum(),
        }
    }

    fn run_node(&mut self, test: &Test, context: &mut ExecutionContext) -> TestResult {
        match test.kind {
            TestKind::Suite => self.run_suite(test, context),
            TestKind::Method => self.run_test(test, context),
        }
    }

    fn run_suite(&mut self, suite: &Test, context: &ExecutionContext) -> TestResult {
        let started = Instant::now();
        self.handler.on_event(&TestEvent::SuiteStarted {
            id: suite.id.clone(),
            full_name: suite.full_name.clone(),
        });

        let mut result = TestResult::new(suite);
        let declared = self.provider.actions_for(suite);
        let mut scope = SuiteActionScope::new(declared.iter().cloned());
        let inherited = declared.into_iter().filter(|a| a.targets().applies_to_upstream_test());
        let mut child_context = context.child(inherited);

        match scope.enter(suite, &context.status) {
            Ok(()) => {
                for child in self.selected_children(suite) {
                    let child_result = if child_context.status.is_stop_requested() {
                        self.not_run(child, ResultState::Skipped, "not run: the run was stopped")
                    } else {
                        self.run_node(child, &mut child_context)
                    };
                    result.add_child(child_result);
                }
            }
            Err(failure) => {
                tracing::warn!(suite = %suite.full_name, error = %failure, "suite setup failed");
                let (state, message) = match &failure {
                    TestFailure::Cancelled => (ResultState::Cancelled, "not run: the run was cancelled".to_string()),
                    other => (ResultState::Error, format!("suite setup failed: {other}")),
                };
                result.record_failure(&failure);
                for child in self.selected_children(suite) {
                    let child_result = self.not_run(child, state, &message);
                    result.add_child(child_result);
                }
            }
        }

        for failure in scope.exit(suite, &context.status) {
            tracing::warn!(suite = %suite.full_name, error = %failure, "suite cleanup failed");
            result.record_teardown_failure(&failure);
        }
        result.roll_up();
        result.duration = started.elapsed();

        self.handler.on_event(&TestEvent::SuiteFinished {
            id: suite.id.clone(),
            full_name: suite.full_name.clone(),
            state: result.state,
        });
        result
    }

    fn run_test(&mut self, test: &Test, context: &mut ExecutionContext) -> TestResult {
        let result = match &test.ignore_reason {
            Some(reason) => {
                let mut result = TestResult::new(test);
                result.set_result(ResultState::Skipped, Some(reason.clone()));
                result
            }
            None => {
                self.handler.on_event(&TestEvent::TestStarted {
                    id: test.id.clone(),
                    full_name: test.full_name.clone(),
                });
                self.execute_method(test, context)
            }
        };

        if context.stop_on_error && result.state.is_failure() {
            tracing::info!(test = %test.full_name, "stopping after failure");
            context.status.request(ExecutionStatus::StopRequested);
        }
        self.handler.on_event(&TestEvent::TestFinished { result: result.clone() });
        result
    }

    fn execute_method(&self, test: &Test, context: &mut ExecutionContext) -> TestResult {
        let started = Instant::now();
        let mut result = match build_chain(test, &self.launcher, Arc::clone(&self.provider)) {
            Ok(chain) => chain.execute(context).unwrap_or_else(|failure| {
                let mut result = TestResult::new(test);
                result.record_failure(&failure);
                result
            }),
            Err(e) => {
                let mut result = TestResult::new(test);
                result.record_failure(&TestFailure::Error(e.to_string()));
                result
            }
        };
        result.duration = started.elapsed();
        result
    }

    /// Result tree for a node that never ran; methods are reported as finished.
    fn not_run(&mut self, test: &Test, state: ResultState, message: &str) -> TestResult {
        let mut result = TestResult::new(test);
        match test.kind {
            TestKind::Method => {
                result.set_result(state, Some(message.to_string()));
                self.handler.on_event(&TestEvent::TestFinished { result: result.clone() });
            }
            TestKind::Suite => {
                for child in self.selected_children(test) {
                    let child_result = self.not_run(child, state, message);
                    result.add_child(child_result);
                }
                result.roll_up();
            }
        }
        result
    }
}
