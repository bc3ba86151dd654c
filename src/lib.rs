#![forbid(unsafe_code)]
//! Isolated test runner
//!
//! isorun loads a test package into a separate agent process, runs it there and streams results
//! back. This crate provides the controller (engine), the agent side (agent), the execution
//! framework that wraps every test in its action hooks (framework), and the `isorun` CLI.
//!
//! ## Panic Policy
//!
//! This codebase follows explicit error handling:
//!
//! - **Production code**: Use `Result` or `Option` with `?` / `ok_or` / `map_err`. The `cli`, `engine`, `agent` and
//!   `framework` modules enforce `#![deny(clippy::unwrap_used)]`.
//!
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests.
//!
//! - **Test failures**: A failing test, hook or timeout is a *value* recorded in its `TestResult`, never a panic or an
//!   error propagated out of the command chain.

pub mod agent;
pub mod cli;
pub mod engine;
pub mod framework;
pub mod package;

pub use engine::{EngineError, EngineResult, IsolatedRunner, ProcessAgency, TestAgency, TestFilter};
pub use framework::result::TestResult;
pub use package::TestPackage;
