//! Typed telemetry items sent by instrumentation.

use devlens_core::{
    ErrorReport, FetchEvent, LogReport, RenderEvent, ServerActionEvent, StreamingEvent,
    SuspenseEvent, TimelineEntry,
};
use serde::{Deserialize, Serialize};

/// One telemetry item, tagged by `kind`.
///
/// Event kinds are recorded into the active session; `navigation` and
/// `unmount` drive the session lifecycle from the client runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ProbeEvent {
    Fetch(FetchEvent),
    ServerAction(ServerActionEvent),
    Render(RenderEvent),
    Suspense(SuspenseEvent),
    Streaming(StreamingEvent),
    Timeline { entries: Vec<TimelineEntry> },
    Error(ErrorReport),
    Log(LogReport),
    /// Client-side route change: sets the current route and begins a session.
    Navigation { route: String },
    /// The client UI unmounted: ends the active session.
    Unmount,
}

impl ProbeEvent {
    /// Short name used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch",
            Self::ServerAction(_) => "server-action",
            Self::Render(_) => "render",
            Self::Suspense(_) => "suspense",
            Self::Streaming(_) => "streaming",
            Self::Timeline { .. } => "timeline",
            Self::Error(_) => "error",
            Self::Log(_) => "log",
            Self::Navigation { .. } => "navigation",
            Self::Unmount => "unmount",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devlens_core::StreamingPhase;

    #[test]
    fn test_probe_event_tagging() {
        let event = ProbeEvent::Streaming(StreamingEvent::now(StreamingPhase::Complete));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "streaming");
        assert_eq!(value["phase"], "complete");
    }

    #[test]
    fn test_navigation_from_json() {
        let event: ProbeEvent =
            serde_json::from_str(r#"{"kind":"navigation","route":"/blog"}"#).unwrap();
        assert_eq!(
            event,
            ProbeEvent::Navigation {
                route: "/blog".to_string()
            }
        );
        assert_eq!(event.kind(), "navigation");
    }

    #[test]
    fn test_server_action_from_json() {
        let json = r#"{"kind":"server-action","name":"createPost","startedAt":1700000000000,
                       "executionMs":18.0,"status":"error","errorMessage":"db down"}"#;
        match serde_json::from_str::<ProbeEvent>(json).unwrap() {
            ProbeEvent::ServerAction(action) => {
                assert!(action.is_failure());
                assert_eq!(action.error_message.as_deref(), Some("db down"));
            }
            other => panic!("Expected ServerAction, got {other:?}"),
        }
    }
}
