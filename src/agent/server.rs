//! Serving the wire protocol over a pair of streams.

use std::io::{self, BufRead, Write};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use isorun_core::settings::NATIVE_RUNTIME;
use isorun_core::status::ExecutionStatus;

use super::local::LocalTestRunner;
use crate::engine::error::EngineError;
use crate::engine::events::{TestEvent, TestEventHandler};
use crate::engine::protocol::{self, Request, Response};
use crate::engine::runner::TestRunner;
use crate::engine::target::AGENT_VERSION;

type SharedWriter<W> = Arc<Mutex<W>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn send<W: Write>(writer: &Mutex<W>, response: &Response) -> Result<(), EngineError> {
    protocol::write_message(&mut *lock(writer), response)
}

/// Forwards events to the controller as they happen.
struct WireEventHandler<W: Write> {
    writer: SharedWriter<W>,
}

impl<W: Write> TestEventHandler for WireEventHandler<W> {
    fn on_event(&mut self, event: &TestEvent) {
        let message = Response::Event { event: event.clone() };
        if let Err(e) = send(&self.writer, &message) {
            tracing::debug!(error = %e, "dropping event");
        }
    }
}

/// Serve requests from `reader` until `stop` or end of input.
///
/// The hello goes out first. `run` executes on a worker thread so that `stop_run` can be honoured
/// while it is in flight; any other request during a run is answered with an error. A run counts
/// as finished once its result is decided, so a request sent right after `run_complete` waits for
/// the worker instead of being rejected.
///
/// ## Errors
///
/// Only failures to talk to the controller end the loop with an error; request failures become
/// [`Response::Error`].
pub fn serve<R, W>(mut reader: R, writer: W, runner: LocalTestRunner) -> Result<(), EngineError>
where
    R: BufRead,
    W: Write + Send + 'static,
{
    let writer: SharedWriter<W> = Arc::new(Mutex::new(writer));
    let status = runner.status();
    let runner = Arc::new(Mutex::new(runner));
    let mut active: Option<JoinHandle<()>> = None;
    let running = Arc::new(AtomicBool::new(false));

    send(
        &writer,
        &Response::Hello {
            runtime: NATIVE_RUNTIME.to_string(),
            version: AGENT_VERSION.to_string(),
            pid: process::id(),
        },
    )?;

    loop {
        let Some(line) = protocol::read_frame(&mut reader)? else {
            tracing::debug!("controller closed input");
            break;
        };
        if active.is_some() && !running.load(Ordering::Acquire) {
            join(active.take());
        }

        let request: Request = match protocol::decode(&line) {
            Ok(request) => request,
            Err(e) => {
                send(&writer, &Response::Error { message: e.to_string() })?;
                continue;
            }
        };
        tracing::debug!(request = request.kind(), "request");

        match request {
            Request::StopRun { force } => {
                let requested = if force {
                    ExecutionStatus::AbortRequested
                } else {
                    ExecutionStatus::StopRequested
                };
                status.request(requested);
            }
            Request::Stop => {
                if active.is_some() {
                    status.request(ExecutionStatus::AbortRequested);
                    join(active.take());
                }
                send(&writer, &Response::Stopping)?;
                return Ok(());
            }
            request if active.is_some() => {
                let message = format!("agent is busy running tests; '{}' rejected", request.kind());
                send(&writer, &Response::Error { message })?;
            }
            Request::Run { filter } => {
                // Reset before the run thread exists: any stop_run read from here on belongs to this run.
                status.reset();
                running.store(true, Ordering::Release);
                let run_running = Arc::clone(&running);
                let runner = Arc::clone(&runner);
                let run_writer = Arc::clone(&writer);
                let spawned = thread::Builder::new()
                    .name("isorun-run".to_string())
                    .spawn(move || {
                        let mut handler = WireEventHandler {
                            writer: Arc::clone(&run_writer),
                        };
                        let response = match lock(&runner).run(&mut handler, &filter) {
                            Ok(result) => Response::RunComplete { result },
                            Err(e) => Response::Error { message: e.to_string() },
                        };
                        // Cleared before the reply: requests after run_complete must not see a busy agent.
                        run_running.store(false, Ordering::Release);
                        if let Err(e) = send(&run_writer, &response) {
                            tracing::warn!(error = %e, "failed to report run result");
                        }
                    });
                match spawned {
                    Ok(handle) => active = Some(handle),
                    Err(e) => {
                        running.store(false, Ordering::Release);
                        let message = format!("failed to start run: {e}");
                        send(&writer, &Response::Error { message })?;
                    }
                }
            }
            Request::Explore { package } => {
                let response = reply(lock(&runner).explore(&package), |result| Response::Explored { result });
                send(&writer, &response)?;
            }
            Request::Load { package } => {
                let response = reply(lock(&runner).load(&package), |result| Response::Loaded { result });
                send(&writer, &response)?;
            }
            Request::Unload => {
                let response = reply(lock(&runner).unload(), |()| Response::Unloaded);
                send(&writer, &response)?;
            }
        }
    }

    if active.is_some() {
        status.request(ExecutionStatus::AbortRequested);
        join(active.take());
    }
    Ok(())
}

/// Serve on this process's stdin/stdout.
pub fn serve_stdio(runner: LocalTestRunner) -> Result<(), EngineError> {
    serve(io::stdin().lock(), io::stdout(), runner)
}

fn reply<T>(outcome: Result<T, EngineError>, ok: impl FnOnce(T) -> Response) -> Response {
    match outcome {
        Ok(value) => ok(value),
        Err(e) => Response::Error { message: e.to_string() },
    }
}

fn join(handle: Option<JoinHandle<()>>) {
    if let Some(handle) = handle {
        if handle.join().is_err() {
            tracing::error!("run thread panicked");
        }
    }
}
