//! Error types for the devlens CLI.

use std::io;
use thiserror::Error;

/// CLI client errors.
///
/// Connection errors mean the daemon is not running or not reachable;
/// `Daemon` carries an `error` reply the daemon sent for a request.
#[derive(Error, Debug)]
pub enum CliError {
    /// Failed to connect to the daemon after all retries.
    #[error("Failed to connect to daemon at {socket}: {reason}")]
    DaemonConnection { socket: String, reason: String },

    /// The daemon refused the handshake.
    #[error("Protocol version mismatch (client: {client_version}, daemon: {daemon_version})")]
    VersionMismatch {
        client_version: String,
        daemon_version: String,
    },

    /// The daemon answered a request with an error.
    #[error("Daemon error{}: {message}", code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default())]
    Daemon {
        message: String,
        code: Option<String>,
    },

    /// Unexpected reply, or the connection closed mid-request.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse message: {0}")]
    ParseError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
