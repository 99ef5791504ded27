//! Protocol message types for daemon communication.

use crate::probe::ProbeEvent;
use crate::version::ProtocolVersion;
use devlens_core::{
    BundlesSnapshot, DiagnosticSnapshot, ErrorEvent, ErrorLogSnapshot, OverlayPosition,
    OverlayView, RuntimeSnapshot, SessionId,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Message types that can be sent by clients to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageType {
    /// Client handshake/connection request
    Connect {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
    },

    /// Begin a session for a route activation
    BeginSession { route: String },

    /// End the active session (no-op if none)
    EndSession,

    /// Set or clear the current-route pointer
    SetRoute {
        #[serde(default)]
        route: Option<String>,
    },

    /// Read the current-route pointer
    GetRoute,

    /// Record one typed telemetry item. Fire-and-forget, no reply.
    Record { event: ProbeEvent },

    /// Raw beacons from the injected browser probe
    ProbeBatch { events: Vec<serde_json::Value> },

    GetRuntime,
    GetErrorLog,
    GetOverlay,

    /// Assemble the full diagnostic document
    GetDiagnostics {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        project_root: Option<PathBuf>,
    },

    /// Run the bundle scanner alone
    ScanBundles {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        project_root: Option<PathBuf>,
    },

    ClearErrorsAndLogs,

    /// Drop all sessions, errors, logs and the current route
    Reset,

    /// Subscribe to session lifecycle and error broadcasts
    Subscribe,

    /// Unsubscribe from broadcasts
    Unsubscribe,

    /// Ping to check connection
    Ping {
        /// Sequence number for matching pong response
        seq: u64,
    },

    /// Client disconnecting gracefully
    Disconnect,
}

impl MessageType {
    /// Short name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::BeginSession { .. } => "begin_session",
            Self::EndSession => "end_session",
            Self::SetRoute { .. } => "set_route",
            Self::GetRoute => "get_route",
            Self::Record { .. } => "record",
            Self::ProbeBatch { .. } => "probe_batch",
            Self::GetRuntime => "get_runtime",
            Self::GetErrorLog => "get_error_log",
            Self::GetOverlay => "get_overlay",
            Self::GetDiagnostics { .. } => "get_diagnostics",
            Self::ScanBundles { .. } => "scan_bundles",
            Self::ClearErrorsAndLogs => "clear_errors_and_logs",
            Self::Reset => "reset",
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Ping { .. } => "ping",
            Self::Disconnect => "disconnect",
        }
    }
}

/// Messages sent from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    pub protocol_version: ProtocolVersion,

    #[serde(flatten)]
    pub message: MessageType,
}

impl ClientMessage {
    /// Creates a new client message with current protocol version.
    pub fn new(message: MessageType) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            message,
        }
    }

    pub fn connect(client_id: Option<String>) -> Self {
        Self::new(MessageType::Connect { client_id })
    }

    pub fn begin_session(route: impl Into<String>) -> Self {
        Self::new(MessageType::BeginSession {
            route: route.into(),
        })
    }

    pub fn end_session() -> Self {
        Self::new(MessageType::EndSession)
    }

    pub fn set_route(route: Option<String>) -> Self {
        Self::new(MessageType::SetRoute { route })
    }

    pub fn get_route() -> Self {
        Self::new(MessageType::GetRoute)
    }

    pub fn record(event: ProbeEvent) -> Self {
        Self::new(MessageType::Record { event })
    }

    pub fn probe_batch(events: Vec<serde_json::Value>) -> Self {
        Self::new(MessageType::ProbeBatch { events })
    }

    pub fn get_runtime() -> Self {
        Self::new(MessageType::GetRuntime)
    }

    pub fn get_error_log() -> Self {
        Self::new(MessageType::GetErrorLog)
    }

    pub fn get_overlay() -> Self {
        Self::new(MessageType::GetOverlay)
    }

    pub fn get_diagnostics(project_root: Option<PathBuf>) -> Self {
        Self::new(MessageType::GetDiagnostics { project_root })
    }

    pub fn scan_bundles(project_root: Option<PathBuf>) -> Self {
        Self::new(MessageType::ScanBundles { project_root })
    }

    pub fn clear_errors_and_logs() -> Self {
        Self::new(MessageType::ClearErrorsAndLogs)
    }

    pub fn reset() -> Self {
        Self::new(MessageType::Reset)
    }

    pub fn subscribe() -> Self {
        Self::new(MessageType::Subscribe)
    }

    pub fn unsubscribe() -> Self {
        Self::new(MessageType::Unsubscribe)
    }

    pub fn ping(seq: u64) -> Self {
        Self::new(MessageType::Ping { seq })
    }

    pub fn disconnect() -> Self {
        Self::new(MessageType::Disconnect)
    }
}

/// Messages sent from daemon to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonMessage {
    /// Connection accepted
    Connected {
        protocol_version: ProtocolVersion,
        client_id: String,
    },

    /// Connection rejected (version mismatch, missing handshake)
    Rejected {
        reason: String,
        /// Daemon's protocol version (for client to upgrade)
        protocol_version: ProtocolVersion,
    },

    SessionBegun { session_id: SessionId },

    /// Current-route pointer
    Route { route: Option<String> },

    Runtime { snapshot: Box<RuntimeSnapshot> },

    ErrorLog { snapshot: Box<ErrorLogSnapshot> },

    /// Overlay view plus the configured anchor corner
    Overlay {
        position: OverlayPosition,
        view: Box<OverlayView>,
    },

    Diagnostics { snapshot: Box<DiagnosticSnapshot> },

    /// Bundle scan result; `None` when no build output exists
    Bundles { bundles: Option<Box<BundlesSnapshot>> },

    /// Result of a probe batch
    BatchAccepted { accepted: u32, rejected: u32 },

    /// Generic acknowledgement for commands without a payload
    Ack,

    /// Pong response to ping
    Pong { seq: u64 },

    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    /// Broadcast: a session began
    SessionStarted { session_id: SessionId, route: String },

    /// Broadcast: a session was finalized
    SessionFinished { session_id: SessionId },

    /// Broadcast: an error was captured
    ErrorCaptured { error: Box<ErrorEvent> },
}

impl DaemonMessage {
    pub fn connected(client_id: String) -> Self {
        Self::Connected {
            protocol_version: ProtocolVersion::CURRENT,
            client_id,
        }
    }

    pub fn rejected(reason: &str) -> Self {
        Self::Rejected {
            reason: reason.to_string(),
            protocol_version: ProtocolVersion::CURRENT,
        }
    }

    pub fn session_begun(session_id: SessionId) -> Self {
        Self::SessionBegun { session_id }
    }

    pub fn route(route: Option<String>) -> Self {
        Self::Route { route }
    }

    pub fn runtime(snapshot: RuntimeSnapshot) -> Self {
        Self::Runtime {
            snapshot: Box::new(snapshot),
        }
    }

    pub fn error_log(snapshot: ErrorLogSnapshot) -> Self {
        Self::ErrorLog {
            snapshot: Box::new(snapshot),
        }
    }

    pub fn overlay(position: OverlayPosition, view: OverlayView) -> Self {
        Self::Overlay {
            position,
            view: Box::new(view),
        }
    }

    pub fn diagnostics(snapshot: DiagnosticSnapshot) -> Self {
        Self::Diagnostics {
            snapshot: Box::new(snapshot),
        }
    }

    pub fn bundles(bundles: Option<BundlesSnapshot>) -> Self {
        Self::Bundles {
            bundles: bundles.map(Box::new),
        }
    }

    pub fn batch_accepted(accepted: u32, rejected: u32) -> Self {
        Self::BatchAccepted { accepted, rejected }
    }

    pub fn pong(seq: u64) -> Self {
        Self::Pong { seq }
    }

    pub fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: None,
        }
    }

    pub fn error_with_code(message: &str, code: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: Some(code.to_string()),
        }
    }

    pub fn session_started(session_id: SessionId, route: String) -> Self {
        Self::SessionStarted { session_id, route }
    }

    pub fn session_finished(session_id: SessionId) -> Self {
        Self::SessionFinished { session_id }
    }

    pub fn error_captured(error: ErrorEvent) -> Self {
        Self::ErrorCaptured {
            error: Box::new(error),
        }
    }

    /// True for unsolicited broadcast messages.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        matches!(
            self,
            Self::SessionStarted { .. } | Self::SessionFinished { .. } | Self::ErrorCaptured { .. }
        )
    }
}
