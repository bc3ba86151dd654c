//! Proxy runner forwarding calls to an agent process.

use std::io;
use std::process::{Child, ChildStdin};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use super::error::EngineError;
use super::events::TestEventHandler;
use super::filter::TestFilter;
use super::protocol::{self, Request, Response};
use super::result::EngineResult;
use super::runner::{RunControl, TestRunner};
use crate::framework::result::TestResult;
use crate::package::TestPackage;

/// How long an agent gets to exit after `stop` before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const EXIT_POLL: Duration = Duration::from_millis(20);

/// The pipes to one agent process.
///
/// Requests go through `writer`; `replies` carries stdout lines forwarded by the reader thread.
pub struct AgentChannel {
    writer: Mutex<ChildStdin>,
    replies: Mutex<Receiver<String>>,
    child: Mutex<Option<Child>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AgentChannel {
    pub(crate) fn new(writer: ChildStdin, replies: Receiver<String>, child: Child) -> Self {
        Self {
            writer: Mutex::new(writer),
            replies: Mutex::new(replies),
            child: Mutex::new(Some(child)),
        }
    }

    fn send(&self, request: &Request) -> Result<(), EngineError> {
        tracing::trace!(request = request.kind(), "-> agent");
        let mut writer = lock(&self.writer);
        protocol::write_message(&mut *writer, request)
    }

    fn receive(&self) -> Result<Response, EngineError> {
        let line = lock(&self.replies).recv().map_err(|_| {
            EngineError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "agent closed its output"))
        })?;
        let response: Response = protocol::decode(&line)?;
        tracing::trace!(response = response.kind(), "<- agent");
        Ok(response)
    }

    /// Send `request` and wait for its single reply.
    fn call(&self, request: &Request) -> Result<Response, EngineError> {
        self.send(request)?;
        match self.receive()? {
            Response::Error { message } => Err(EngineError::Remote(message)),
            response => Ok(response),
        }
    }

    /// Ask the agent to exit, then make sure it has.
    pub(crate) fn shutdown(&self) -> Result<(), EngineError> {
        if let Err(e) = self.send(&Request::Stop) {
            tracing::debug!(error = %e, "agent did not accept stop");
        }
        let Some(mut child) = lock(&self.child).take() else {
            return Ok(());
        };
        let deadline = Instant::now() + SHUTDOWN_GRACE;
        loop {
            if child.try_wait()?.is_some() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                tracing::warn!(pid = child.id(), "agent did not exit in time, killing it");
                child.kill()?;
                child.wait()?;
                return Ok(());
            }
            thread::sleep(EXIT_POLL);
        }
    }
}

fn unexpected(expected: &'static str, got: &Response) -> EngineError {
    EngineError::UnexpectedResponse {
        expected,
        got: got.kind().to_string(),
    }
}

/// [`TestRunner`] whose work happens inside an agent process.
pub struct RemoteRunner {
    channel: Arc<AgentChannel>,
}

impl RemoteRunner {
    pub(crate) fn new(channel: Arc<AgentChannel>) -> Self {
        Self { channel }
    }
}

impl TestRunner for RemoteRunner {
    fn explore(&mut self, package: &TestPackage) -> Result<EngineResult, EngineError> {
        let request = Request::Explore {
            package: package.clone(),
        };
        match self.channel.call(&request)? {
            Response::Explored { result } => Ok(result),
            other => Err(unexpected("explored", &other)),
        }
    }

    fn load(&mut self, package: &TestPackage) -> Result<EngineResult, EngineError> {
        let request = Request::Load {
            package: package.clone(),
        };
        match self.channel.call(&request)? {
            Response::Loaded { result } => Ok(result),
            other => Err(unexpected("loaded", &other)),
        }
    }

    fn run(&mut self, handler: &mut dyn TestEventHandler, filter: &TestFilter) -> Result<TestResult, EngineError> {
        self.channel.send(&Request::Run { filter: filter.clone() })?;
        loop {
            match self.channel.receive()? {
                Response::Event { event } => handler.on_event(&event),
                Response::RunComplete { result } => return Ok(result),
                Response::Error { message } => return Err(EngineError::Remote(message)),
                other => return Err(unexpected("run_complete", &other)),
            }
        }
    }

    fn unload(&mut self) -> Result<(), EngineError> {
        match self.channel.call(&Request::Unload)? {
            Response::Unloaded => Ok(()),
            other => Err(unexpected("unloaded", &other)),
        }
    }

    fn run_control(&self) -> Option<Arc<dyn RunControl>> {
        Some(Arc::new(RemoteRunControl {
            channel: Arc::clone(&self.channel),
        }))
    }
}

/// Writes stop requests while another thread waits on the run.
struct RemoteRunControl {
    channel: Arc<AgentChannel>,
}

impl RunControl for RemoteRunControl {
    fn stop_run(&self, force: bool) -> Result<(), EngineError> {
        self.channel.send(&Request::StopRun { force })
    }
}
