//! Agents living in the calling process.
//!
//! No isolation: test processes are still separate, but the runner shares the controller's address
//! space. Only the current environment can be served.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use isorun_core::settings::NATIVE_RUNTIME;

use super::agency::{TestAgency, TestAgent};
use super::error::EngineError;
use super::runner::TestRunner;
use super::target::{AGENT_VERSION, ExecutionTarget};
use crate::agent::LocalTestRunner;

/// Hands out in-process agents.
#[derive(Debug, Default)]
pub struct InProcessAgency {
    issued: Arc<AtomicUsize>,
}

impl InProcessAgency {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TestAgency for InProcessAgency {
    fn get_agent(
        &self,
        target: &ExecutionTarget,
        _timeout: Duration,
        _debug: bool,
    ) -> Result<Box<dyn TestAgent>, EngineError> {
        if !target.matches(NATIVE_RUNTIME, AGENT_VERSION) {
            return Err(EngineError::unavailable(
                target,
                format!("in-process agents only serve {}", ExecutionTarget::current()),
            ));
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(InProcessAgent {
            id: format!("inprocess-{n}"),
            target: target.clone(),
            stopped: false,
        }))
    }
}

/// An agent whose runners are [`LocalTestRunner`]s.
#[derive(Debug)]
pub struct InProcessAgent {
    id: String,
    target: ExecutionTarget,
    stopped: bool,
}

impl TestAgent for InProcessAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn target(&self) -> &ExecutionTarget {
        &self.target
    }

    fn create_runner(&mut self) -> Result<Box<dyn TestRunner>, EngineError> {
        if self.stopped {
            return Err(EngineError::unavailable(&self.target, format!("{} has been stopped", self.id)));
        }
        Ok(Box::new(LocalTestRunner::new()?))
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        self.stopped = true;
        Ok(())
    }

    fn is_stopped(&self) -> bool {
        self.stopped
    }
}
