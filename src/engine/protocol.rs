//! Controller/agent wire protocol.
//!
//! Newline-delimited JSON over the agent's stdin (requests) and stdout (responses). The agent speaks
//! first with [`Response::Hello`]. Every request except [`Request::StopRun`] gets exactly one reply;
//! `Run` is additionally preceded by any number of [`Response::Event`] messages.

use std::io::{BufRead, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::error::EngineError;
use super::events::TestEvent;
use super::filter::TestFilter;
use super::result::EngineResult;
use crate::framework::result::TestResult;
use crate::package::TestPackage;

/// Controller → agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Explore { package: TestPackage },
    Load { package: TestPackage },
    Run { filter: TestFilter },
    /// Out of band; no reply. `force` aborts instead of stopping.
    StopRun { force: bool },
    Unload,
    Stop,
}

impl Request {
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Explore { .. } => "explore",
            Request::Load { .. } => "load",
            Request::Run { .. } => "run",
            Request::StopRun { .. } => "stop_run",
            Request::Unload => "unload",
            Request::Stop => "stop",
        }
    }
}

/// Agent → controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Hello { runtime: String, version: String, pid: u32 },
    Explored { result: EngineResult },
    Loaded { result: EngineResult },
    Event { event: TestEvent },
    RunComplete { result: TestResult },
    Unloaded,
    Stopping,
    Error { message: String },
}

impl Response {
    pub fn kind(&self) -> &'static str {
        match self {
            Response::Hello { .. } => "hello",
            Response::Explored { .. } => "explored",
            Response::Loaded { .. } => "loaded",
            Response::Event { .. } => "event",
            Response::RunComplete { .. } => "run_complete",
            Response::Unloaded => "unloaded",
            Response::Stopping => "stopping",
            Response::Error { .. } => "error",
        }
    }
}

/// Write one message as a single line and flush.
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<(), EngineError> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    writer.write_all(line.as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Read the next non-blank line; `Ok(None)` at end of stream.
pub fn read_frame<R: BufRead>(reader: &mut R) -> Result<Option<String>, EngineError> {
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if !line.trim().is_empty() {
            return Ok(Some(line));
        }
    }
}

/// Decode one already-framed line.
pub fn decode<T: DeserializeOwned>(line: &str) -> Result<T, EngineError> {
    Ok(serde_json::from_str(line.trim())?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::package::SuiteSpec;

    #[test]
    fn test_messages_are_one_line_each() {
        let mut buf = Vec::new();
        write_message(&mut buf, &Request::Run { filter: TestFilter::Keyword("db".into()) }).unwrap();
        write_message(&mut buf, &Request::StopRun { force: true }).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "{\"type\":\"run\",\"filter\":{\"type\":\"keyword\",\"value\":\"db\"}}\n{\"type\":\"stop_run\",\"force\":true}\n"
        );
    }

    #[test]
    fn test_read_skips_blank_lines_and_reports_eof() {
        let mut input = Cursor::new("\n\n{\"type\":\"unload\"}\n  \n");
        let first = read_frame(&mut input).unwrap().unwrap();
        assert_eq!(decode::<Request>(&first).unwrap(), Request::Unload);
        assert_eq!(read_frame(&mut input).unwrap(), None);
    }

    #[test]
    fn test_package_travels_intact() {
        let package = TestPackage::new("p", SuiteSpec::new("p")).with_setting("StopOnError", true);
        let mut buf = Vec::new();
        write_message(&mut buf, &Request::Load { package: package.clone() }).unwrap();
        let line = read_frame(&mut Cursor::new(buf)).unwrap().unwrap();
        assert_eq!(decode::<Request>(&line).unwrap(), Request::Load { package });
    }

    #[test]
    fn test_garbage_is_a_protocol_error() {
        let err = decode::<Response>("{\"type\":\"nope\"}").unwrap_err();
        assert!(matches!(err, EngineError::Protocol(_)));
    }
}
