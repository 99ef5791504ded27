//! Telemetry event schema.
//!
//! Events are immutable once recorded. Instrumentation builds the bare event
//! (no id); the session store wraps it in [`Recorded`] when it is accepted.
//! JSON uses camelCase keys and millisecond-epoch timestamps so the browser
//! overlay can read it directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::id::EventId;

// ============================================================================
// Recorded Wrapper
// ============================================================================

/// An event that has been accepted by a store and assigned an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recorded<T> {
    pub id: EventId,
    #[serde(flatten)]
    pub event: T,
}

impl<T> Recorded<T> {
    pub fn new(id: EventId, event: T) -> Self {
        Self { id, event }
    }
}

// ============================================================================
// Enumerations
// ============================================================================

/// Where a fetch call originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchOrigin {
    ServerComponent,
    ServerAction,
    RouteHandler,
    ClientComponent,
    #[default]
    Unknown,
}

impl FetchOrigin {
    /// Short label for text rendering.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::ServerComponent => "rsc",
            Self::ServerAction => "action",
            Self::RouteHandler => "route",
            Self::ClientComponent => "client",
            Self::Unknown => "?",
        }
    }
}

/// Outcome of the framework's data cache for a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheResult {
    Hit,
    Miss,
    Bypass,
    #[default]
    Unknown,
}

impl fmt::Display for CacheResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hit => write!(f, "hit"),
            Self::Miss => write!(f, "miss"),
            Self::Bypass => write!(f, "bypass"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Result of a server action invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    #[default]
    Success,
    Error,
}

/// Phase marker emitted while a streamed response is being flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamingPhase {
    Shell,
    Data,
    Content,
    Complete,
}

impl fmt::Display for StreamingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shell => write!(f, "shell"),
            Self::Data => write!(f, "data"),
            Self::Content => write!(f, "content"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

// ============================================================================
// Event Variants
// ============================================================================

/// HTTP status at or above which a fetch counts as failed.
pub const FETCH_FAILURE_STATUS: u16 = 500;

/// A `fetch` call observed during rendering, an action, or a route handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchEvent {
    #[serde(default)]
    pub route: Option<String>,
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub origin: FetchOrigin,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,
    pub duration_ms: f64,
    #[serde(default)]
    pub cache_mode: Option<String>,
    #[serde(default)]
    pub cache_result: CacheResult,
    /// Network-level failure message (the request never produced a status).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl FetchEvent {
    /// Creates a fetch event started now with zero duration.
    pub fn new(url: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            route: None,
            url: url.into(),
            method: method.into(),
            origin: FetchOrigin::Unknown,
            status: None,
            started_at: Utc::now(),
            duration_ms: 0.0,
            cache_mode: None,
            cache_result: CacheResult::Unknown,
            error: None,
        }
    }

    /// True when the request failed at the network level or the server
    /// answered with a 5xx status.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.error.is_some() || self.status.is_some_and(|s| s >= FETCH_FAILURE_STATUS)
    }
}

/// A server action invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerActionEvent {
    #[serde(default)]
    pub route: Option<String>,
    pub name: String,
    #[serde(default)]
    pub source_file: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,
    pub execution_ms: f64,
    #[serde(default)]
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_stack: Option<String>,
}

impl ServerActionEvent {
    pub fn new(name: impl Into<String>, execution_ms: f64, status: ActionStatus) -> Self {
        Self {
            route: None,
            name: name.into(),
            source_file: None,
            started_at: Utc::now(),
            execution_ms,
            status,
            error_message: None,
            error_stack: None,
        }
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status == ActionStatus::Error
    }
}

/// Render timing for a single server component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderEvent {
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub source_file: Option<String>,
    #[serde(default)]
    pub component_name: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,
    pub duration_ms: f64,
    #[serde(default)]
    pub is_async: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RenderEvent {
    pub fn new(component_name: Option<String>, duration_ms: f64) -> Self {
        Self {
            route: None,
            source_file: None,
            component_name,
            started_at: Utc::now(),
            duration_ms,
            is_async: false,
            error: None,
        }
    }

    /// Best available label: component name, then source file.
    #[must_use]
    pub fn label(&self) -> &str {
        self.component_name
            .as_deref()
            .or(self.source_file.as_deref())
            .unwrap_or("anonymous")
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// A suspense boundary that showed a fallback and later resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspenseEvent {
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub boundary: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub resolved_at: DateTime<Utc>,
    pub fallback_ms: f64,
    pub content_resolve_ms: f64,
    /// Set when the boundary resolved into an error boundary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SuspenseEvent {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Instantaneous streaming phase marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingEvent {
    #[serde(default)]
    pub route: Option<String>,
    pub phase: StreamingPhase,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl StreamingEvent {
    pub fn now(phase: StreamingPhase) -> Self {
        Self {
            route: None,
            phase,
            timestamp: Utc::now(),
        }
    }
}

// ============================================================================
// Timeline
// ============================================================================

/// Kind tag for a timeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimelineKind {
    Fetch,
    ServerAction,
    Render,
    Suspense,
    Streaming,
    Navigation,
    Error,
    Log,
}

/// Lightweight reference placed on a session's merged timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub kind: TimelineKind,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    /// Back-reference into one of the session's typed sequences.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<EventId>,
}
