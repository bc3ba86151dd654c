//! Controller-side lifecycle: agencies, agents, runner proxies and the isolated runner.
//!
//! ## Layers
//!
//! - [`agency`]: acquire and release agents for an [`target::ExecutionTarget`].
//! - [`runner`]: the explore/load/run/unload seam, implemented remotely by [`remote::RemoteRunner`]
//!   and locally by [`crate::agent::LocalTestRunner`].
//! - [`isolated`]: [`isolated::IsolatedRunner`] composes the two and owns cleanup.
//! - [`protocol`]: the JSON-lines messages exchanged with agent processes.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod agency;
pub mod error;
pub mod events;
pub mod filter;
pub mod inprocess;
pub mod isolated;
pub mod protocol;
pub mod remote;
pub mod result;
pub mod runner;
pub mod target;

pub use agency::{AgentCommand, ProcessAgency, TestAgency, TestAgent};
pub use error::EngineError;
pub use events::{TestEvent, TestEventHandler};
pub use filter::TestFilter;
pub use inprocess::InProcessAgency;
pub use isolated::{IsolatedRunner, RunnerState};
pub use result::{EngineResult, TestNode};
pub use runner::{RunControl, TestRunner};
pub use target::ExecutionTarget;
