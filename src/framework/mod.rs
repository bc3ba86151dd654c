//! Agent-side execution: the test tree, the command chain and the action pipeline.
//!
//! Nothing in here knows about processes hosting agents or the wire; [`execute::SuiteRunner`] is
//! driven by whatever runner hosts it and reports through a [`crate::engine::events::TestEventHandler`].

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod action;
pub mod command;
pub mod context;
pub mod execute;
pub mod process;
pub mod result;
