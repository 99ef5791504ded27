//! Store actor commands, errors, and events.
//!
//! - `StoreCommand`: messages sent to the actor
//! - `StoreError`: the one way a request can fail
//! - `StoreEvent`: lifecycle notifications published to subscribers

use devlens_core::{
    ErrorEvent, ErrorLogSnapshot, ErrorReport, FetchEvent, LogReport, RenderEvent,
    RuntimeSnapshot, ServerActionEvent, SessionId, StreamingEvent, SuspenseEvent, TimelineEntry,
};
use thiserror::Error;
use tokio::sync::oneshot;

// ============================================================================
// Store Commands
// ============================================================================

/// Commands sent to the store actor.
///
/// Record commands carry no reply channel: they are fire-and-forget and are
/// dropped silently when no session is active. Everything else answers on a
/// oneshot channel.
#[derive(Debug)]
pub enum StoreCommand {
    /// Finalize any active session and begin a new one.
    BeginSession {
        route: String,
        respond_to: oneshot::Sender<SessionId>,
    },

    /// End the active session. Replies with the ended id, if any.
    EndSession {
        respond_to: oneshot::Sender<Option<SessionId>>,
    },

    SetCurrentRoute {
        route: Option<String>,
        respond_to: oneshot::Sender<()>,
    },

    GetCurrentRoute {
        respond_to: oneshot::Sender<Option<String>>,
    },

    // Event payloads are boxed to keep the enum small.
    RecordFetch(Box<FetchEvent>),
    RecordServerAction(Box<ServerActionEvent>),
    RecordRender(Box<RenderEvent>),
    RecordSuspense(Box<SuspenseEvent>),
    RecordStreaming(Box<StreamingEvent>),
    AddTimelineEntries(Vec<TimelineEntry>),
    RecordError(Box<ErrorReport>),
    RecordLog(Box<LogReport>),

    GetRuntimeSnapshot {
        respond_to: oneshot::Sender<RuntimeSnapshot>,
    },

    GetErrorLogSnapshot {
        respond_to: oneshot::Sender<ErrorLogSnapshot>,
    },

    /// Both snapshots, taken in one turn of the actor loop.
    GetSnapshots {
        respond_to: oneshot::Sender<(RuntimeSnapshot, ErrorLogSnapshot)>,
    },

    ClearErrorsAndLogs {
        respond_to: oneshot::Sender<()>,
    },

    /// Drop every session, error and log, and the current-route pointer.
    Reset {
        respond_to: oneshot::Sender<()>,
    },
}

impl StoreCommand {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BeginSession { .. } => "begin_session",
            Self::EndSession { .. } => "end_session",
            Self::SetCurrentRoute { .. } => "set_current_route",
            Self::GetCurrentRoute { .. } => "get_current_route",
            Self::RecordFetch(_) => "record_fetch",
            Self::RecordServerAction(_) => "record_server_action",
            Self::RecordRender(_) => "record_render",
            Self::RecordSuspense(_) => "record_suspense",
            Self::RecordStreaming(_) => "record_streaming",
            Self::AddTimelineEntries(_) => "add_timeline_entries",
            Self::RecordError(_) => "record_error",
            Self::RecordLog(_) => "record_log",
            Self::GetRuntimeSnapshot { .. } => "get_runtime_snapshot",
            Self::GetErrorLogSnapshot { .. } => "get_error_log_snapshot",
            Self::GetSnapshots { .. } => "get_snapshots",
            Self::ClearErrorsAndLogs { .. } => "clear_errors_and_logs",
            Self::Reset { .. } => "reset",
        }
    }
}

// ============================================================================
// Store Errors
// ============================================================================

/// Errors that can occur during store requests.
///
/// The stores themselves never fail; only the channel to the actor can.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The actor has shut down or dropped the reply.
    #[error("store channel closed")]
    ChannelClosed,
}

impl StoreError {
    /// Error code reported to protocol clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ChannelClosed => "internal",
        }
    }
}

// ============================================================================
// Store Events
// ============================================================================

/// Events published by the store to subscribers.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    SessionStarted { session_id: SessionId, route: String },

    /// A session received its end timestamp, explicitly or by being
    /// superseded.
    SessionFinished { session_id: SessionId },

    ErrorCaptured { error: Box<ErrorEvent> },
}
