//! Parsing raw beacons from the injected browser probe.
//!
//! The probe is a few lines of script patched into the app entry point. It
//! sends loosely typed objects (`type` tag, millisecond-epoch floats,
//! abbreviated keys) and never retries, so parsing is lenient: unknown enum
//! strings fall back to `unknown`, missing timestamps mean "now".

use chrono::{DateTime, TimeZone, Utc};
use devlens_core::{
    ActionStatus, CacheResult, CaptureSource, ErrorReport, FetchEvent, FetchOrigin, LogLevel,
    LogReport, RenderEvent, ServerActionEvent, Severity, StreamingEvent, StreamingPhase,
    SuspenseEvent,
};
use serde::Deserialize;
use thiserror::Error;

use crate::probe::ProbeEvent;

/// Raw beacon JSON structure sent by the browser probe.
///
/// All fields except `type` are optional; which ones are required depends on
/// the beacon type and is checked in [`RawBeacon::into_probe_event`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBeacon {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub route: Option<String>,
    /// Start (or occurrence) time, ms since epoch.
    #[serde(default)]
    pub ts: Option<f64>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    /// HTTP status for fetches, `"success"`/`"error"` for actions.
    #[serde(default)]
    pub status: Option<serde_json::Value>,
    #[serde(default)]
    pub cache: Option<String>,
    #[serde(default)]
    pub cache_result: Option<String>,
    /// Action, component or boundary name.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default, rename = "async")]
    pub is_async: Option<bool>,
    #[serde(default)]
    pub resolved_at: Option<f64>,
    #[serde(default)]
    pub fallback_duration: Option<f64>,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub stack: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
}

/// Errors produced while converting a beacon.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProbeParseError {
    #[error("unknown beacon type: {0}")]
    UnknownKind(String),

    #[error("{kind} beacon is missing `{field}`")]
    MissingField { kind: String, field: &'static str },

    #[error("invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: String },

    #[error("malformed beacon: {0}")]
    Malformed(String),
}

impl RawBeacon {
    /// Parses a JSON value into a typed probe event.
    ///
    /// # Errors
    ///
    /// Returns `ProbeParseError` if the value is not a beacon object, has an
    /// unknown type, or lacks a field its type requires.
    pub fn parse(value: serde_json::Value) -> Result<ProbeEvent, ProbeParseError> {
        let raw: RawBeacon =
            serde_json::from_value(value).map_err(|e| ProbeParseError::Malformed(e.to_string()))?;
        raw.into_probe_event()
    }

    /// Converts the beacon into a typed probe event.
    ///
    /// # Errors
    ///
    /// See [`RawBeacon::parse`].
    pub fn into_probe_event(self) -> Result<ProbeEvent, ProbeParseError> {
        match self.kind.as_str() {
            "fetch" => self.into_fetch().map(ProbeEvent::Fetch),
            "action" | "server-action" => self.into_action().map(ProbeEvent::ServerAction),
            "render" => self.into_render().map(ProbeEvent::Render),
            "suspense" => self.into_suspense().map(ProbeEvent::Suspense),
            "stream" | "streaming" => self.into_streaming().map(ProbeEvent::Streaming),
            "error" => self.into_error().map(ProbeEvent::Error),
            "log" => self.into_log().map(ProbeEvent::Log),
            "navigation" => {
                let route = self.require(self.route.clone(), "route")?;
                Ok(ProbeEvent::Navigation { route })
            }
            "unmount" => Ok(ProbeEvent::Unmount),
            other => Err(ProbeParseError::UnknownKind(other.to_string())),
        }
    }

    fn require<T>(&self, value: Option<T>, field: &'static str) -> Result<T, ProbeParseError> {
        value.ok_or_else(|| ProbeParseError::MissingField {
            kind: self.kind.clone(),
            field,
        })
    }

    fn started_at(&self) -> Result<DateTime<Utc>, ProbeParseError> {
        self.ts.map_or_else(|| Ok(Utc::now()), |ms| millis_to_datetime("ts", ms))
    }

    fn into_fetch(self) -> Result<FetchEvent, ProbeParseError> {
        let started_at = self.started_at()?;
        let url = self.require(self.url.clone(), "url")?;
        let status = match &self.status {
            None | Some(serde_json::Value::Null) => None,
            Some(value) => Some(http_status(value)?),
        };

        Ok(FetchEvent {
            route: self.route,
            url,
            method: self
                .method
                .map(|m| m.to_ascii_uppercase())
                .unwrap_or_else(|| "GET".to_string()),
            origin: self.origin.as_deref().map(parse_origin).unwrap_or_default(),
            status,
            started_at,
            duration_ms: non_negative(self.duration),
            cache_mode: self.cache,
            cache_result: self
                .cache_result
                .as_deref()
                .map(parse_cache_result)
                .unwrap_or_default(),
            error: self.error,
        })
    }

    fn into_action(self) -> Result<ServerActionEvent, ProbeParseError> {
        let started_at = self.started_at()?;
        let name = self.require(self.name.clone(), "name")?;
        let status_error = self
            .status
            .as_ref()
            .and_then(serde_json::Value::as_str)
            .is_some_and(|s| s.eq_ignore_ascii_case("error"));
        let status = if status_error || self.error.is_some() {
            ActionStatus::Error
        } else {
            ActionStatus::Success
        };

        Ok(ServerActionEvent {
            route: self.route,
            name,
            source_file: self.file,
            started_at,
            execution_ms: non_negative(self.duration),
            status,
            error_message: self.error.or(self.message),
            error_stack: self.stack,
        })
    }

    fn into_render(self) -> Result<RenderEvent, ProbeParseError> {
        let started_at = self.started_at()?;
        if self.name.is_none() && self.file.is_none() {
            return Err(ProbeParseError::MissingField {
                kind: self.kind,
                field: "name",
            });
        }

        Ok(RenderEvent {
            route: self.route,
            source_file: self.file,
            component_name: self.name,
            started_at,
            duration_ms: non_negative(self.duration),
            is_async: self.is_async.unwrap_or(false),
            error: self.error,
        })
    }

    fn into_suspense(self) -> Result<SuspenseEvent, ProbeParseError> {
        let started_at = self.started_at()?;
        let resolved_at = match self.resolved_at {
            Some(ms) => millis_to_datetime("resolvedAt", ms)?,
            None => {
                let total = self.require(self.duration, "resolvedAt")?;
                chrono::Duration::try_milliseconds(total.max(0.0) as i64)
                    .and_then(|d| started_at.checked_add_signed(d))
                    .ok_or_else(|| ProbeParseError::InvalidValue {
                        field: "duration",
                        value: total.to_string(),
                    })?
            }
        };
        let total_ms = (resolved_at - started_at).num_milliseconds().max(0) as f64;
        let fallback_ms = non_negative(self.fallback_duration);

        Ok(SuspenseEvent {
            route: self.route,
            boundary: self.name,
            started_at,
            resolved_at,
            fallback_ms,
            content_resolve_ms: (total_ms - fallback_ms).max(0.0),
            error: self.error,
        })
    }

    fn into_streaming(self) -> Result<StreamingEvent, ProbeParseError> {
        let timestamp = self.started_at()?;
        let phase = self.require(self.phase.clone(), "phase")?;
        let phase = match phase.as_str() {
            "shell" => StreamingPhase::Shell,
            "data" => StreamingPhase::Data,
            "content" => StreamingPhase::Content,
            "complete" | "done" => StreamingPhase::Complete,
            _ => {
                return Err(ProbeParseError::InvalidValue {
                    field: "phase",
                    value: phase,
                })
            }
        };

        Ok(StreamingEvent {
            route: self.route,
            phase,
            timestamp,
        })
    }

    fn into_error(self) -> Result<ErrorReport, ProbeParseError> {
        let timestamp = self.ts.map(|ms| millis_to_datetime("ts", ms)).transpose()?;
        let message = self.require(self.message.clone(), "message")?;
        let severity = match self.level.as_deref() {
            Some("warn" | "warning") => Severity::Warning,
            _ => Severity::Error,
        };

        Ok(ErrorReport {
            route: self.route,
            source: CaptureSource::Client,
            severity,
            message,
            stack: self.stack,
            metadata: self.meta,
            timestamp,
            session_id: None,
        })
    }

    fn into_log(self) -> Result<LogReport, ProbeParseError> {
        let timestamp = self.ts.map(|ms| millis_to_datetime("ts", ms)).transpose()?;
        let message = self.require(self.message.clone(), "message")?;
        let level = match self.level.as_deref() {
            Some("debug" | "trace") => LogLevel::Debug,
            Some("warn" | "warning") => LogLevel::Warn,
            Some("error") => LogLevel::Error,
            _ => LogLevel::Info,
        };

        Ok(LogReport {
            route: self.route,
            source: CaptureSource::Client,
            level,
            message,
            metadata: self.meta,
            timestamp,
            session_id: None,
        })
    }
}

fn millis_to_datetime(field: &'static str, ms: f64) -> Result<DateTime<Utc>, ProbeParseError> {
    if !ms.is_finite() {
        return Err(ProbeParseError::InvalidValue {
            field,
            value: ms.to_string(),
        });
    }
    Utc.timestamp_millis_opt(ms as i64)
        .single()
        .ok_or_else(|| ProbeParseError::InvalidValue {
            field,
            value: ms.to_string(),
        })
}

fn http_status(value: &serde_json::Value) -> Result<u16, ProbeParseError> {
    value
        .as_u64()
        .and_then(|n| u16::try_from(n).ok())
        .filter(|n| (100..=599).contains(n))
        .ok_or_else(|| ProbeParseError::InvalidValue {
            field: "status",
            value: value.to_string(),
        })
}

fn non_negative(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(0.0).max(0.0)
}

fn parse_origin(s: &str) -> FetchOrigin {
    match s {
        "server-component" | "rsc" => FetchOrigin::ServerComponent,
        "server-action" | "action" => FetchOrigin::ServerAction,
        "route-handler" | "route" => FetchOrigin::RouteHandler,
        "client-component" | "client" => FetchOrigin::ClientComponent,
        _ => FetchOrigin::Unknown,
    }
}

fn parse_cache_result(s: &str) -> CacheResult {
    match s.to_ascii_lowercase().as_str() {
        "hit" | "fresh" | "stale" => CacheResult::Hit,
        "miss" => CacheResult::Miss,
        "bypass" | "skip" | "no-store" => CacheResult::Bypass,
        _ => CacheResult::Unknown,
    }
}
