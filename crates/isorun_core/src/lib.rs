//! Provide the shared vocabulary of the isorun controller and agent.
//!
//! This crate is intentionally small and dependency-light. Both sides of the process boundary use it to
//! agree on:
//! - the spelling and defaults of package settings,
//! - the action target scopes (`test`, `suite`, `default`),
//! - result states and the run-wide execution status.
//!
//! ## Notes
//!
//! - **No IO**, no global state, no engine types. Serde support is behind the `serde` feature.

pub mod registry;
pub mod settings;
pub mod status;
pub mod targets;

pub use status::{ExecutionStatus, ResultState};
pub use targets::ActionTargets;
