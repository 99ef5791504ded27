//! devlens protocol - wire protocol for daemon communication
//!
//! This crate provides message types and parsing for communication
//! between the injected runtime probe and the daemon, and between the
//! daemon and CLI clients. Messages are newline-delimited JSON.

pub mod message;
pub mod parse;
pub mod probe;
pub mod version;

pub use message::{ClientMessage, DaemonMessage, MessageType};
pub use parse::{ProbeParseError, RawBeacon};
pub use probe::ProbeEvent;
pub use version::{ProtocolVersion, VersionError};
