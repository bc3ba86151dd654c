//! Action hooks and the pipeline that runs them around a test.
//!
//! ## Ordering
//!
//! For one test the hook set is: actions inherited from enclosing suites (targets `test` only, outer
//! suites first) followed by the test's own actions (targets `test` or `default`, declaration order).
//! Before-hooks run in that order; after-hooks run in reverse, and only for items whose before-hook
//! was attempted.
//!
//! ## Cancellation
//!
//! The run-wide [`StatusFlag`] is consulted before every before-hook and before the test itself. Once
//! an abort is requested the test is recorded as cancelled and no after-hooks run.

use std::sync::Arc;

use isorun_core::ActionTargets;

use super::command::{CommandError, TestCommand};
use super::context::{ExecutionContext, StatusFlag};
use super::process::ProcessLauncher;
use super::result::{TestFailure, TestResult};
use super::test::{Test, TestKind};
use crate::package::ActionSpec;

/// A cross-cutting hook pair.
pub trait TestAction: Send + Sync {
    fn name(&self) -> &str;

    fn targets(&self) -> ActionTargets;

    fn before_test(&self, test: &Test) -> Result<(), TestFailure>;

    fn after_test(&self, test: &Test) -> Result<(), TestFailure>;
}

/// One action inside one execution; remembers whether its before-hook fired.
pub struct ActionItem {
    action: Arc<dyn TestAction>,
    started: bool,
}

impl ActionItem {
    pub fn new(action: Arc<dyn TestAction>) -> Self {
        Self { action, started: false }
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn name(&self) -> &str {
        self.action.name()
    }

    /// Marks the item started, then runs the before-hook.
    pub fn before(&mut self, test: &Test) -> Result<(), TestFailure> {
        self.started = true;
        self.action.before_test(test)
    }

    /// Runs the after-hook if the before-hook was attempted; otherwise does nothing.
    pub fn after(&mut self, test: &Test) -> Result<(), TestFailure> {
        if !self.started {
            return Ok(());
        }
        self.action.after_test(test)
    }
}

// ============================================================================
// Discovery
// ============================================================================

/// Supplies the actions declared on a test or suite.
pub trait ActionProvider: Send + Sync {
    fn actions_for(&self, test: &Test) -> Vec<Arc<dyn TestAction>>;
}

/// Provides nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoActions;

impl ActionProvider for NoActions {
    fn actions_for(&self, _test: &Test) -> Vec<Arc<dyn TestAction>> {
        Vec::new()
    }
}

/// Turns manifest action declarations into process-backed actions.
#[derive(Debug, Clone)]
pub struct ManifestActionProvider {
    launcher: ProcessLauncher,
}

impl ManifestActionProvider {
    pub fn new(launcher: ProcessLauncher) -> Self {
        Self { launcher }
    }
}

impl ActionProvider for ManifestActionProvider {
    fn actions_for(&self, test: &Test) -> Vec<Arc<dyn TestAction>> {
        test.actions
            .iter()
            .map(|spec| Arc::new(ProcessAction::new(spec.clone(), self.launcher.clone())) as Arc<dyn TestAction>)
            .collect()
    }
}

/// An action whose hooks are argv commands.
///
/// Hooks see `ISORUN_TEST_NAME`, `ISORUN_ACTION` and `ISORUN_PHASE` (`before` or `after`). A missing
/// hook is a no-op; a non-zero exit is an error.
#[derive(Debug, Clone)]
pub struct ProcessAction {
    spec: ActionSpec,
    launcher: ProcessLauncher,
}

impl ProcessAction {
    pub fn new(spec: ActionSpec, launcher: ProcessLauncher) -> Self {
        Self { spec, launcher }
    }

    fn run_hook(&self, phase: &str, argv: &[String], test: &Test) -> Result<(), TestFailure> {
        if argv.is_empty() {
            return Ok(());
        }
        let env = [
            ("ISORUN_TEST_NAME", test.full_name.as_str()),
            ("ISORUN_ACTION", self.spec.name.as_str()),
            ("ISORUN_PHASE", phase),
        ];
        let outcome = self.launcher.run(argv, &env, None).map_err(|e| {
            TestFailure::Error(format!("{phase} hook of action '{}' failed: {e}", self.spec.name))
        })?;
        if outcome.success() {
            return Ok(());
        }
        Err(TestFailure::Error(format!(
            "{phase} hook of action '{}' {}",
            self.spec.name,
            outcome.failure_summary()
        )))
    }
}

impl TestAction for ProcessAction {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn targets(&self) -> ActionTargets {
        self.spec.targets
    }

    fn before_test(&self, test: &Test) -> Result<(), TestFailure> {
        self.run_hook("before", &self.spec.before, test)
    }

    fn after_test(&self, test: &Test) -> Result<(), TestFailure> {
        self.run_hook("after", &self.spec.after, test)
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Wraps a test method's command with its before/after hooks.
pub struct ActionCommand {
    inner: Box<dyn TestCommand>,
    provider: Arc<dyn ActionProvider>,
}

impl ActionCommand {
    /// ## Errors
    ///
    /// [`CommandError::NotATestMethod`] when `inner` does not execute a test method.
    pub fn new(inner: Box<dyn TestCommand>, provider: Arc<dyn ActionProvider>) -> Result<Self, CommandError> {
        let test = inner.test();
        if test.kind != TestKind::Method {
            return Err(CommandError::NotATestMethod(test.full_name.clone()));
        }
        Ok(Self { inner, provider })
    }

    fn items_for(&self, test: &Test, context: &ExecutionContext) -> Vec<ActionItem> {
        let upstream = context
            .upstream_actions
            .iter()
            .filter(|a| a.targets().applies_to_upstream_test())
            .cloned();
        let own = self
            .provider
            .actions_for(test)
            .into_iter()
            .filter(|a| a.targets().applies_to_own_test());
        upstream.chain(own).map(ActionItem::new).collect()
    }

    fn run_guarded(
        &self,
        items: &mut [ActionItem],
        context: &mut ExecutionContext,
    ) -> Result<TestResult, TestFailure> {
        let test = self.inner.test();
        for item in items.iter_mut() {
            if context.status.is_abort_requested() {
                return Err(TestFailure::Cancelled);
            }
            tracing::trace!(action = item.name(), test = %test.full_name, "before");
            item.before(test)?;
        }
        if context.status.is_abort_requested() {
            return Err(TestFailure::Cancelled);
        }
        self.inner.execute(context)
    }
}

impl TestCommand for ActionCommand {
    fn test(&self) -> &Test {
        self.inner.test()
    }

    fn name(&self) -> &'static str {
        "actions"
    }

    fn inner(&self) -> Option<&dyn TestCommand> {
        Some(self.inner.as_ref())
    }

    fn execute(&self, context: &mut ExecutionContext) -> Result<TestResult, TestFailure> {
        let test = self.inner.test();
        context.current_result = TestResult::new(test);
        let mut items = self.items_for(test, context);

        match self.run_guarded(&mut items, context) {
            Ok(result) => context.current_result = result,
            Err(failure) => {
                if failure == TestFailure::Cancelled {
                    tracing::debug!(test = %test.full_name, "cancelled");
                }
                context.current_result.record_failure(&failure);
            }
        }

        if context.status.is_abort_requested() {
            tracing::debug!(test = %test.full_name, "abort requested, skipping after hooks");
        } else {
            for item in items.iter_mut().rev() {
                if let Err(failure) = item.after(test) {
                    tracing::warn!(action = item.name(), test = %test.full_name, error = %failure, "after hook failed");
                    context.current_result.record_teardown_failure(&failure);
                }
            }
        }

        Ok(context.current_result.clone())
    }
}

/// Suite-level actions: before-hooks on entry, reversed after-hooks on exit.
pub struct SuiteActionScope {
    items: Vec<ActionItem>,
}

impl SuiteActionScope {
    /// Keeps the actions that target the suite itself.
    pub fn new(actions: impl IntoIterator<Item = Arc<dyn TestAction>>) -> Self {
        let items = actions
            .into_iter()
            .filter(|a| a.targets().applies_to_own_suite())
            .map(ActionItem::new)
            .collect();
        Self { items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Run before-hooks in order; stops at the first failure or abort.
    pub fn enter(&mut self, suite: &Test, status: &StatusFlag) -> Result<(), TestFailure> {
        for item in &mut self.items {
            if status.is_abort_requested() {
                return Err(TestFailure::Cancelled);
            }
            item.before(suite)?;
        }
        Ok(())
    }

    /// Run after-hooks of started items in reverse; returns every failure. Nothing runs on abort.
    pub fn exit(&mut self, suite: &Test, status: &StatusFlag) -> Vec<TestFailure> {
        if status.is_abort_requested() {
            return Vec::new();
        }
        self.items
            .iter_mut()
            .rev()
            .filter_map(|item| item.after(suite).err())
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use isorun_core::ResultState;
    use isorun_core::status::ExecutionStatus;

    use super::*;
    use crate::framework::command::tests::ScriptedCommand;

    pub(crate) type Log = Arc<Mutex<Vec<String>>>;

    /// Records hook calls; optionally fails or requests abort from a hook.
    pub(crate) struct RecordingAction {
        pub name: String,
        pub targets: ActionTargets,
        pub log: Log,
        pub fail_before: bool,
        pub fail_after: bool,
        pub abort_in_before: Option<StatusFlag>,
    }

    impl RecordingAction {
        pub(crate) fn new(name: &str, targets: ActionTargets, log: &Log) -> Self {
            Self {
                name: name.to_string(),
                targets,
                log: log.clone(),
                fail_before: false,
                fail_after: false,
                abort_in_before: None,
            }
        }

        pub(crate) fn arc(self) -> Arc<dyn TestAction> {
            Arc::new(self)
        }
    }

    impl TestAction for RecordingAction {
        fn name(&self) -> &str {
            &self.name
        }

        fn targets(&self) -> ActionTargets {
            self.targets
        }

        fn before_test(&self, _test: &Test) -> Result<(), TestFailure> {
            self.log.lock().unwrap().push(format!("before {}", self.name));
            if let Some(status) = &self.abort_in_before {
                status.request(ExecutionStatus::AbortRequested);
            }
            if self.fail_before {
                return Err(TestFailure::Error(format!("{} setup failed", self.name)));
            }
            Ok(())
        }

        fn after_test(&self, _test: &Test) -> Result<(), TestFailure> {
            self.log.lock().unwrap().push(format!("after {}", self.name));
            if self.fail_after {
                return Err(TestFailure::Error(format!("{} cleanup failed", self.name)));
            }
            Ok(())
        }
    }

    /// Hands out a fixed list for every test.
    pub(crate) struct FixedProvider(pub Vec<Arc<dyn TestAction>>);

    impl ActionProvider for FixedProvider {
        fn actions_for(&self, _test: &Test) -> Vec<Arc<dyn TestAction>> {
            self.0.clone()
        }
    }

    fn pipeline(log: &Log, actions: Vec<Arc<dyn TestAction>>) -> ActionCommand {
        let leaf = ScriptedCommand::passing(Test::method("t", &["true"]), log.clone());
        ActionCommand::new(Box::new(leaf), Arc::new(FixedProvider(actions))).unwrap()
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[test]
    fn test_hooks_wrap_the_test_in_reverse_order() {
        let log: Log = Arc::default();
        let actions = vec![
            RecordingAction::new("a1", ActionTargets::Test, &log).arc(),
            RecordingAction::new("a2", ActionTargets::Default, &log).arc(),
            RecordingAction::new("a3", ActionTargets::Test, &log).arc(),
        ];
        let result = pipeline(&log, actions)
            .execute(&mut ExecutionContext::new(StatusFlag::new()))
            .unwrap();

        assert_eq!(result.state, ResultState::Passed);
        assert_eq!(
            entries(&log),
            vec!["before a1", "before a2", "before a3", "run t", "after a3", "after a2", "after a1"]
        );
    }

    #[test]
    fn test_failed_before_hook_unwinds_only_started_items() {
        let log: Log = Arc::default();
        let mut failing = RecordingAction::new("a2", ActionTargets::Test, &log);
        failing.fail_before = true;
        let actions = vec![
            RecordingAction::new("a1", ActionTargets::Test, &log).arc(),
            failing.arc(),
            RecordingAction::new("a3", ActionTargets::Test, &log).arc(),
        ];
        let result = pipeline(&log, actions)
            .execute(&mut ExecutionContext::new(StatusFlag::new()))
            .unwrap();

        assert_eq!(result.state, ResultState::Error);
        assert_eq!(result.message.as_deref(), Some("a2 setup failed"));
        assert_eq!(entries(&log), vec!["before a1", "before a2", "after a2", "after a1"]);
    }

    #[test]
    fn test_abort_during_before_skips_everything_after() {
        let log: Log = Arc::default();
        let status = StatusFlag::new();
        let mut aborting = RecordingAction::new("a1", ActionTargets::Test, &log);
        aborting.abort_in_before = Some(status.clone());
        let actions = vec![aborting.arc(), RecordingAction::new("a2", ActionTargets::Test, &log).arc()];

        let result = pipeline(&log, actions)
            .execute(&mut ExecutionContext::new(status))
            .unwrap();

        assert_eq!(result.state, ResultState::Cancelled);
        assert_eq!(entries(&log), vec!["before a1"]);
    }

    #[test]
    fn test_cancelled_inner_command_is_consumed() {
        let log: Log = Arc::default();
        let leaf = ScriptedCommand::with_outcomes(
            Test::method("t", &["true"]),
            log.clone(),
            vec![Err(TestFailure::Cancelled)],
        );
        let command = ActionCommand::new(
            Box::new(leaf),
            Arc::new(FixedProvider(vec![RecordingAction::new("a1", ActionTargets::Test, &log).arc()])),
        )
        .unwrap();

        let result = command.execute(&mut ExecutionContext::new(StatusFlag::new()));
        let result = result.unwrap();
        assert_eq!(result.state, ResultState::Cancelled);
        assert_eq!(entries(&log), vec!["before a1", "run t", "after a1"]);
    }

    #[test]
    fn test_after_hook_failure_is_recorded_and_unwinding_continues() {
        let log: Log = Arc::default();
        let mut failing = RecordingAction::new("a2", ActionTargets::Test, &log);
        failing.fail_after = true;
        let actions = vec![RecordingAction::new("a1", ActionTargets::Test, &log).arc(), failing.arc()];

        let result = pipeline(&log, actions)
            .execute(&mut ExecutionContext::new(StatusFlag::new()))
            .unwrap();

        assert_eq!(result.state, ResultState::Error);
        assert_eq!(result.message.as_deref(), Some("teardown: a2 cleanup failed"));
        assert_eq!(entries(&log), vec!["before a1", "before a2", "run t", "after a2", "after a1"]);
    }

    #[test]
    fn test_target_filtering_between_upstream_and_own() {
        let log: Log = Arc::default();
        let mut context = ExecutionContext::new(StatusFlag::new());
        context.upstream_actions = vec![
            RecordingAction::new("up_test", ActionTargets::Test, &log).arc(),
            RecordingAction::new("up_default", ActionTargets::Default, &log).arc(),
            RecordingAction::new("up_suite", ActionTargets::Suite, &log).arc(),
        ];
        let own = vec![
            RecordingAction::new("own_test", ActionTargets::Test, &log).arc(),
            RecordingAction::new("own_default", ActionTargets::Default, &log).arc(),
            RecordingAction::new("own_suite", ActionTargets::Suite, &log).arc(),
        ];

        pipeline(&log, own).execute(&mut context).unwrap();

        assert_eq!(
            entries(&log),
            vec![
                "before up_test",
                "before own_test",
                "before own_default",
                "run t",
                "after own_default",
                "after own_test",
                "after up_test",
            ]
        );
    }

    #[test]
    fn test_result_is_left_in_context() {
        let log: Log = Arc::default();
        let leaf = ScriptedCommand::with_outcomes(
            Test::method("t", &["true"]),
            log.clone(),
            vec![Ok((ResultState::Failed, Duration::from_millis(3)))],
        );
        let command = ActionCommand::new(Box::new(leaf), Arc::new(NoActions)).unwrap();
        let mut context = ExecutionContext::new(StatusFlag::new());
        let result = command.execute(&mut context).unwrap();
        assert_eq!(result, context.current_result);
        assert_eq!(result.state, ResultState::Failed);
    }

    #[test]
    fn test_suite_inner_command_is_rejected() {
        let log: Log = Arc::default();
        let leaf = ScriptedCommand::passing(Test::suite("s"), log);
        let err = ActionCommand::new(Box::new(leaf), Arc::new(NoActions)).err().unwrap();
        assert_eq!(err, CommandError::NotATestMethod("s".to_string()));
    }

    #[test]
    fn test_suite_scope_runs_only_suite_targets() {
        let log: Log = Arc::default();
        let status = StatusFlag::new();
        let suite = Test::suite("s");
        let mut scope = SuiteActionScope::new(vec![
            RecordingAction::new("s_test", ActionTargets::Test, &log).arc(),
            RecordingAction::new("s_default", ActionTargets::Default, &log).arc(),
            RecordingAction::new("s_suite", ActionTargets::Suite, &log).arc(),
        ]);
        scope.enter(&suite, &status).unwrap();
        assert!(scope.exit(&suite, &status).is_empty());
        assert_eq!(
            entries(&log),
            vec!["before s_default", "before s_suite", "after s_suite", "after s_default"]
        );
    }

    #[test]
    fn test_suite_scope_skips_cleanup_on_abort() {
        let log: Log = Arc::default();
        let status = StatusFlag::new();
        let suite = Test::suite("s");
        let mut scope = SuiteActionScope::new(vec![RecordingAction::new("s", ActionTargets::Suite, &log).arc()]);
        scope.enter(&suite, &status).unwrap();
        status.request(ExecutionStatus::AbortRequested);
        assert!(scope.exit(&suite, &status).is_empty());
        assert_eq!(entries(&log), vec!["before s"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_action_reports_hook_failure() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let launcher = ProcessLauncher::new(runtime.handle().clone(), ".");
        let spec = ActionSpec {
            name: "db".into(),
            targets: ActionTargets::Test,
            before: vec!["sh".into(), "-c".into(), "test \"$ISORUN_PHASE\" = before".into()],
            after: vec!["false".into()],
        };
        let action = ProcessAction::new(spec, launcher);
        let test = Test::method("t", &["true"]);
        action.before_test(&test).unwrap();
        let err = action.after_test(&test).unwrap_err();
        assert!(err.to_string().starts_with("after hook of action 'db' exited with status 1"), "{err}");
    }
}
