//! The agent side: a [`LocalTestRunner`] served over the wire protocol.
//!
//! The `isorun-agent` binary is a thin shell around [`serve_stdio`]. Its stdout belongs to the
//! protocol, so everything it logs goes to stderr.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod local;
pub mod server;

pub use local::LocalTestRunner;
pub use server::{serve, serve_stdio};
