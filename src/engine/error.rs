//! Engine-level errors.
//!
//! Test failures never surface here: they are recorded in a `TestResult`. These errors describe the
//! lifecycle itself going wrong (no agent, no loaded package, a broken channel).

use thiserror::Error;

use super::target::ExecutionTarget;

/// Errors raised by agencies, agents, runners and the wire protocol.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unable to acquire an agent for '{target}': {reason}")]
    AgentUnavailable { target: ExecutionTarget, reason: String },

    #[error("no package is loaded")]
    NotLoaded,

    #[error("agent reported an error: {0}")]
    Remote(String),

    #[error("unexpected response from agent: expected '{expected}', got '{got}'")]
    UnexpectedResponse { expected: &'static str, got: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed protocol message: {0}")]
    Protocol(#[from] serde_json::Error),
}

impl EngineError {
    pub(crate) fn unavailable(target: &ExecutionTarget, reason: impl Into<String>) -> Self {
        EngineError::AgentUnavailable {
            target: target.clone(),
            reason: reason.into(),
        }
    }
}
