//! The runner that does the actual work, inside an agent.

use std::sync::Arc;

use isorun_core::settings;
use isorun_core::status::ExecutionStatus;
use tokio::runtime::Runtime;

use crate::engine::error::EngineError;
use crate::engine::events::TestEventHandler;
use crate::engine::filter::TestFilter;
use crate::engine::result::EngineResult;
use crate::engine::runner::{RunControl, TestRunner};
use crate::framework::action::ManifestActionProvider;
use crate::framework::context::{ExecutionContext, StatusFlag};
use crate::framework::execute::SuiteRunner;
use crate::framework::process::ProcessLauncher;
use crate::framework::result::TestResult;
use crate::framework::test::Test;
use crate::package::TestPackage;

struct LoadedPackage {
    package: TestPackage,
    tree: Test,
}

/// Builds test trees from packages and executes them on a tokio runtime.
pub struct LocalTestRunner {
    runtime: Arc<Runtime>,
    loaded: Option<LoadedPackage>,
    status: StatusFlag,
}

impl LocalTestRunner {
    /// A runner with its own multi-threaded runtime.
    pub fn new() -> Result<Self, EngineError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("isorun-exec")
            .enable_all()
            .build()?;
        Ok(Self::with_runtime(Arc::new(runtime)))
    }

    pub fn with_runtime(runtime: Arc<Runtime>) -> Self {
        Self {
            runtime,
            loaded: None,
            status: StatusFlag::new(),
        }
    }

    /// The status flag runs observe; shared with [`TestRunner::run_control`].
    ///
    /// Cleared on load and when a run completes.
    pub fn status(&self) -> StatusFlag {
        self.status.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    fn inspect(package: &TestPackage) -> (Test, EngineResult) {
        let tree = Test::build(&package.suite);
        let mut errors = tree.structural_errors();
        let work_dir = package.work_directory();
        if !work_dir.is_dir() {
            errors.push(format!("working directory '{}' does not exist", work_dir.display()));
        }
        let result = EngineResult::with_errors(tree.to_node(), errors);
        (tree, result)
    }
}

impl TestRunner for LocalTestRunner {
    fn explore(&mut self, package: &TestPackage) -> Result<EngineResult, EngineError> {
        let (_, result) = Self::inspect(package);
        tracing::debug!(package = %package.name, tests = result.tree.test_count(), "explored");
        Ok(result)
    }

    fn load(&mut self, package: &TestPackage) -> Result<EngineResult, EngineError> {
        self.loaded = None;
        self.status.reset();
        let (tree, result) = Self::inspect(package);
        if result.has_errors() {
            tracing::warn!(package = %package.name, errors = result.errors.len(), "package not loaded");
        } else {
            tracing::info!(package = %package.name, tests = tree.test_count(), "package loaded");
            self.loaded = Some(LoadedPackage {
                package: package.clone(),
                tree,
            });
        }
        Ok(result)
    }

    fn run(&mut self, handler: &mut dyn TestEventHandler, filter: &TestFilter) -> Result<TestResult, EngineError> {
        let loaded = self.loaded.as_ref().ok_or(EngineError::NotLoaded)?;

        let launcher = ProcessLauncher::new(self.runtime.handle().clone(), loaded.package.work_directory());
        let provider = Arc::new(ManifestActionProvider::new(launcher.clone()));
        let mut context = ExecutionContext::new(self.status.clone());
        context.stop_on_error = loaded.package.get_setting(settings::STOP_ON_ERROR, false);

        let result = SuiteRunner::new(launcher, provider, filter, handler).run(&loaded.tree, &mut context);
        self.status.reset();
        tracing::info!(package = %loaded.package.name, state = %result.state, "run finished");
        Ok(result)
    }

    fn unload(&mut self) -> Result<(), EngineError> {
        if let Some(loaded) = self.loaded.take() {
            tracing::debug!(package = %loaded.package.name, "unloaded");
        }
        Ok(())
    }

    fn run_control(&self) -> Option<Arc<dyn RunControl>> {
        Some(Arc::new(LocalRunControl(self.status.clone())))
    }
}

struct LocalRunControl(StatusFlag);

impl RunControl for LocalRunControl {
    fn stop_run(&self, force: bool) -> Result<(), EngineError> {
        let status = if force {
            ExecutionStatus::AbortRequested
        } else {
            ExecutionStatus::StopRequested
        };
        self.0.request(status);
        Ok(())
    }
}
