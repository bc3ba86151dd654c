//! The runner seam.

use std::sync::Arc;

use super::error::EngineError;
use super::events::TestEventHandler;
use super::filter::TestFilter;
use super::result::EngineResult;
use crate::framework::result::TestResult;
use crate::package::TestPackage;

/// Explore, load, run and unload a package.
///
/// Implemented locally by the agent and remotely by a proxy talking to one.
pub trait TestRunner: Send {
    fn explore(&mut self, package: &TestPackage) -> Result<EngineResult, EngineError>;

    /// Load `package`; a result with errors means nothing is loaded.
    fn load(&mut self, package: &TestPackage) -> Result<EngineResult, EngineError>;

    /// Run the loaded package.
    ///
    /// ## Errors
    ///
    /// [`EngineError::NotLoaded`] when no package is loaded.
    fn run(&mut self, handler: &mut dyn TestEventHandler, filter: &TestFilter) -> Result<TestResult, EngineError>;

    fn unload(&mut self) -> Result<(), EngineError>;

    /// Handle for stopping a run from another thread, when supported.
    fn run_control(&self) -> Option<Arc<dyn RunControl>> {
        None
    }
}

/// Out-of-band stop for a run in flight.
pub trait RunControl: Send + Sync {
    /// Request a stop; `force` aborts and skips cleanup hooks.
    fn stop_run(&self, force: bool) -> Result<(), EngineError>;
}
