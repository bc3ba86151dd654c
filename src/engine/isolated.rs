//! Running a package inside an agent.
//!
//! [`IsolatedRunner`] holds at most one agent and one runner proxy obtained from it. It forwards
//! explore/load/run/unload and is responsible for the cleanup guarantees:
//!
//! - a load that reports errors, or fails outright, leaves nothing loaded and no proxy attached;
//! - `unload` always drops the proxy, even when the forwarded call fails;
//! - `dispose` (and `Drop`) always stops the agent.
//!
//! The agent itself survives unload and is reused by the next explore or load, unless the package
//! asks for a different execution target or the agent has been stopped. While a proxy is attached,
//! explore goes through it regardless of target.

use std::sync::Arc;
use std::time::Duration;

use isorun_core::settings;

use super::agency::{TestAgency, TestAgent};
use super::error::EngineError;
use super::events::TestEventHandler;
use super::filter::TestFilter;
use super::result::EngineResult;
use super::runner::{RunControl, TestRunner};
use super::target::ExecutionTarget;
use crate::framework::result::TestResult;
use crate::package::TestPackage;

/// Where an [`IsolatedRunner`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Unloaded,
    Acquiring,
    Loaded,
    Running,
}

/// Executes packages in an agent acquired from an agency.
pub struct IsolatedRunner {
    agency: Box<dyn TestAgency>,
    agent: Option<Box<dyn TestAgent>>,
    runner: Option<Box<dyn TestRunner>>,
    package: Option<TestPackage>,
    target: Option<ExecutionTarget>,
    state: RunnerState,
}

impl IsolatedRunner {
    pub fn new(agency: Box<dyn TestAgency>) -> Self {
        Self {
            agency,
            agent: None,
            runner: None,
            package: None,
            target: None,
            state: RunnerState::Unloaded,
        }
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// Target resolved by the most recent explore or load.
    pub fn runtime_framework(&self) -> Option<&ExecutionTarget> {
        self.target.as_ref()
    }

    /// The package currently loaded, if any.
    pub fn package(&self) -> Option<&TestPackage> {
        self.package.as_ref()
    }

    pub fn has_agent(&self) -> bool {
        self.agent.is_some()
    }

    /// Explore `package` without loading it.
    ///
    /// An attached proxy is reused whatever target the package asks for, so exploring never
    /// changes what is loaded. A transport failure abandons the agent.
    #[tracing::instrument(skip_all, fields(package = %package.name))]
    pub fn explore(&mut self, package: &TestPackage) -> Result<EngineResult, EngineError> {
        let outcome = match self.runner.as_mut() {
            Some(runner) => runner.explore(package),
            None => {
                let target = ExecutionTarget::from_package(package);
                self.target = Some(target.clone());
                self.ensure_runner(&target, package)
                    .and_then(|runner| runner.explore(package))
            }
        };
        if let Err(e) = &outcome {
            tracing::warn!(error = %e, "explore failed");
            if is_channel_failure(e) {
                self.abandon_agent();
            }
        }
        outcome
    }

    /// Load `package`, replacing anything loaded before.
    ///
    /// ## Errors
    ///
    /// Acquisition and transport failures are returned after the runner has unloaded itself. A load
    /// the agent rejects is not an error: the result carries the errors and nothing stays loaded.
    #[tracing::instrument(skip_all, fields(package = %package.name))]
    pub fn load(&mut self, package: &TestPackage) -> Result<EngineResult, EngineError> {
        tracing::info!("Loading {}", package.name);
        self.unload_quietly();

        self.state = RunnerState::Acquiring;
        let target = ExecutionTarget::from_package(package);
        self.target = Some(target.clone());

        let outcome = self
            .ensure_runner(&target, package)
            .and_then(|runner| runner.load(package));
        match outcome {
            Ok(result) if !result.has_errors() => {
                self.package = Some(package.clone());
                self.state = RunnerState::Loaded;
                Ok(result)
            }
            Ok(result) => {
                tracing::warn!(errors = result.errors.len(), "load reported errors");
                self.unload_quietly();
                Ok(result)
            }
            Err(e) => {
                tracing::warn!(error = %e, "load failed");
                self.unload_quietly();
                if is_channel_failure(&e) {
                    self.release_agent();
                }
                Err(e)
            }
        }
    }

    /// Unload the package and drop the proxy. A no-op when nothing is attached.
    pub fn unload(&mut self) -> Result<(), EngineError> {
        self.package = None;
        self.state = RunnerState::Unloaded;
        match self.runner.take() {
            Some(mut runner) => {
                tracing::debug!("unloading");
                runner.unload()
            }
            None => Ok(()),
        }
    }

    /// Run the loaded package.
    ///
    /// ## Errors
    ///
    /// [`EngineError::NotLoaded`] unless the last load succeeded; otherwise whatever the proxy returns.
    #[tracing::instrument(skip_all)]
    pub fn run(&mut self, handler: &mut dyn TestEventHandler, filter: &TestFilter) -> Result<TestResult, EngineError> {
        if self.state != RunnerState::Loaded {
            return Err(EngineError::NotLoaded);
        }
        let runner = self.runner.as_mut().ok_or(EngineError::NotLoaded)?;
        self.state = RunnerState::Running;
        let outcome = runner.run(handler, filter);
        self.state = RunnerState::Loaded;
        outcome
    }

    /// Stop handle for a run in flight, usable from another thread.
    pub fn run_control(&self) -> Option<Arc<dyn RunControl>> {
        self.runner.as_ref().and_then(|runner| runner.run_control())
    }

    /// Stop the agent and forget it. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        self.runner = None;
        self.package = None;
        self.state = RunnerState::Unloaded;
        if self.agent.is_some() {
            tracing::info!("Stopping remote agent");
            self.release_agent();
        }
    }

    fn unload_quietly(&mut self) {
        if let Err(e) = self.unload() {
            tracing::warn!(error = %e, "unload failed");
        }
    }

    /// Forget everything tied to an agent that can no longer be talked to.
    fn abandon_agent(&mut self) {
        self.runner = None;
        self.package = None;
        self.state = RunnerState::Unloaded;
        self.release_agent();
    }

    fn release_agent(&mut self) {
        if let Some(mut agent) = self.agent.take() {
            self.agency.release(agent.as_mut());
        }
    }

    /// The proxy for `target`, acquiring an agent first when needed.
    fn ensure_runner(
        &mut self,
        target: &ExecutionTarget,
        package: &TestPackage,
    ) -> Result<&mut Box<dyn TestRunner>, EngineError> {
        let reusable = self
            .agent
            .as_ref()
            .is_some_and(|agent| !agent.is_stopped() && agent.target() == target);
        if !reusable {
            self.runner = None;
            self.release_agent();

            let timeout_ms: u64 = package.get_setting(settings::AGENT_TIMEOUT, settings::DEFAULT_AGENT_TIMEOUT_MS);
            let debug: bool = package.get_setting(settings::AGENT_DEBUG, false);
            let agent = self
                .agency
                .get_agent(target, Duration::from_millis(timeout_ms), debug)?;
            tracing::debug!(agent = agent.id(), %target, "acquired agent");
            self.agent = Some(agent);
        }

        let runner = match (self.runner.take(), self.agent.as_mut()) {
            (Some(runner), _) => runner,
            (None, Some(agent)) => agent.create_runner()?,
            (None, None) => return Err(EngineError::unavailable(target, "no agent attached")),
        };
        Ok(self.runner.insert(runner))
    }
}

/// Errors after which the agent cannot be trusted to answer again.
fn is_channel_failure(error: &EngineError) -> bool {
    matches!(
        error,
        EngineError::Io(_) | EngineError::Protocol(_) | EngineError::UnexpectedResponse { .. }
    )
}

impl Drop for IsolatedRunner {
    fn drop(&mut self) {
        self.dispose();
    }
}
