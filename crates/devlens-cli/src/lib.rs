//! devlens CLI - terminal client for the devlens daemon
//!
//! - `client` - socket connection, handshake and typed requests
//! - `render` - plain-text rendering of overlay, runtime and error data
//! - `cli` - argument parsing and command dispatch
//!
//! No `.unwrap()`, `.expect()` or `panic!()` outside tests.

pub mod cli;
pub mod client;
pub mod error;
pub mod render;

pub use client::{DaemonClient, DaemonConfig};
pub use error::{CliError, Result};
