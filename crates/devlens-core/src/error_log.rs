//! Bounded buffers for captured errors and log lines.
//!
//! Independent of session lifecycle: errors and logs are kept even when no
//! session is active. Each buffer evicts its oldest entries past its cap.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::id::{EventId, SessionId};

/// Default maximum number of retained errors.
pub const DEFAULT_MAX_ERRORS: usize = 100;

/// Default maximum number of retained log lines.
pub const DEFAULT_MAX_LOGS: usize = 200;

/// Which side of the app produced the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureSource {
    Client,
    #[default]
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

// ============================================================================
// Reports (input) and Events (stored)
// ============================================================================

/// An error as reported by a hook, before it is assigned an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub source: CaptureSource,
    #[serde(default)]
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub session_id: Option<SessionId>,
}

impl ErrorReport {
    pub fn new(source: CaptureSource, message: impl Into<String>) -> Self {
        Self {
            route: None,
            source,
            severity: Severity::Error,
            message: message.into(),
            stack: None,
            metadata: None,
            timestamp: None,
            session_id: None,
        }
    }

    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

/// A stored error entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    pub id: EventId,
    pub route: Option<String>,
    pub source: CaptureSource,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Lookup hint only; the session may since have been evicted.
    #[serde(default)]
    pub session_id: Option<SessionId>,
}

impl ErrorEvent {
    fn from_report(id: EventId, report: ErrorReport) -> Self {
        Self {
            id,
            route: report.route,
            source: report.source,
            severity: report.severity,
            message: report.message,
            stack: report.stack,
            metadata: report.metadata,
            timestamp: report.timestamp.unwrap_or_else(Utc::now),
            session_id: report.session_id,
        }
    }
}

/// A log line as reported by a hook, before it is assigned an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogReport {
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub source: CaptureSource,
    #[serde(default)]
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub session_id: Option<SessionId>,
}

impl LogReport {
    pub fn new(source: CaptureSource, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            route: None,
            source,
            level,
            message: message.into(),
            metadata: None,
            timestamp: None,
            session_id: None,
        }
    }
}

/// A stored log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub id: EventId,
    pub route: Option<String>,
    pub source: CaptureSource,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub session_id: Option<SessionId>,
}

impl LogEvent {
    fn from_report(id: EventId, report: LogReport) -> Self {
        Self {
            id,
            route: report.route,
            source: report.source,
            level: report.level,
            message: report.message,
            metadata: report.metadata,
            timestamp: report.timestamp.unwrap_or_else(Utc::now),
            session_id: report.session_id,
        }
    }
}

// ============================================================================
// Store
// ============================================================================

/// Point-in-time copy of the error and log buffers (oldest first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLogSnapshot {
    pub errors: Vec<ErrorEvent>,
    pub logs: Vec<LogEvent>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_updated: DateTime<Utc>,
}

impl ErrorLogSnapshot {
    pub fn empty() -> Self {
        Self {
            errors: Vec::new(),
            logs: Vec::new(),
            last_updated: Utc::now(),
        }
    }
}

impl Default for ErrorLogSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Append-only bounded buffers for errors and logs.
#[derive(Debug)]
pub struct ErrorLogStore {
    errors: VecDeque<ErrorEvent>,
    logs: VecDeque<LogEvent>,
    max_errors: usize,
    max_logs: usize,
    last_updated: DateTime<Utc>,
}

impl ErrorLogStore {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_ERRORS, DEFAULT_MAX_LOGS)
    }

    /// Creates a store with custom caps (each at least 1).
    pub fn with_limits(max_errors: usize, max_logs: usize) -> Self {
        Self {
            errors: VecDeque::new(),
            logs: VecDeque::new(),
            max_errors: max_errors.max(1),
            max_logs: max_logs.max(1),
            last_updated: Utc::now(),
        }
    }

    /// Stores an error and returns the stored entry.
    pub fn record_error(&mut self, report: ErrorReport) -> ErrorEvent {
        let event = ErrorEvent::from_report(EventId::generate("err"), report);
        self.errors.push_back(event.clone());
        while self.errors.len() > self.max_errors {
            self.errors.pop_front();
        }
        self.last_updated = Utc::now();
        event
    }

    /// Stores a log line and returns its id.
    pub fn record_log(&mut self, report: LogReport) -> EventId {
        let event = LogEvent::from_report(EventId::generate("log"), report);
        let id = event.id.clone();
        self.logs.push_back(event);
        while self.logs.len() > self.max_logs {
            self.logs.pop_front();
        }
        self.last_updated = Utc::now();
        id
    }

    #[must_use]
    pub fn snapshot(&self) -> ErrorLogSnapshot {
        ErrorLogSnapshot {
            errors: self.errors.iter().cloned().collect(),
            logs: self.logs.iter().cloned().collect(),
            last_updated: self.last_updated,
        }
    }

    pub fn clear(&mut self) {
        self.errors.clear();
        self.logs.clear();
        self.last_updated = Utc::now();
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    #[must_use]
    pub fn log_count(&self) -> usize {
        self.logs.len()
    }
}

impl Default for ErrorLogStore {
    fn default() -> Self {
        Self::new()
    }
}
