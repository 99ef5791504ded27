//! Type-safe identifiers for sessions and recorded events.
//!
//! Identifiers are drawn from a single process-wide counter, so an id is
//! unique for the lifetime of the process regardless of which store
//! instance minted it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide sequence shared by every identifier kind.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_sequence() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Unique identifier for a telemetry session (one route activation).
///
/// Format: `session_<n>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

/// Prefix used for generated session identifiers.
pub const SESSION_ID_PREFIX: &str = "session";

impl SessionId {
    /// Creates a SessionId from an existing string.
    ///
    /// Used when an id arrives over the wire; no format validation is done.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mints a fresh, process-unique session id.
    pub fn generate() -> Self {
        Self(format!("{SESSION_ID_PREFIX}_{}", next_sequence()))
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Unique identifier for a recorded event, error or log entry.
///
/// Format: `<kind>_<n>`, e.g. `fetch_12` or `err_40`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mints a fresh, process-unique id carrying the given kind prefix.
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{prefix}_{}", next_sequence()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
