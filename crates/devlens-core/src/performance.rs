//! Per-session performance summaries for the diagnostics document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{Recorded, RenderEvent};
use crate::id::{EventId, SessionId};
use crate::overlay::slowest_render;
use crate::session::{RuntimeSnapshot, Session};

/// Event family grouped in a waterfall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WaterfallKind {
    Fetch,
    ServerAction,
    Render,
}

/// One bar in a waterfall group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterfallEntry {
    pub id: EventId,
    pub label: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,
    pub duration_ms: f64,
}

/// Events of one kind within a session, with their summed duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterfallGroup {
    pub kind: WaterfallKind,
    pub total_duration_ms: f64,
    pub entries: Vec<WaterfallEntry>,
}

impl WaterfallGroup {
    fn new(kind: WaterfallKind, entries: Vec<WaterfallEntry>) -> Option<Self> {
        if entries.is_empty() {
            return None;
        }
        let total_duration_ms = entries.iter().map(|e| e.duration_ms).sum();
        Some(Self {
            kind,
            total_duration_ms,
            entries,
        })
    }
}

/// Derived timing figures for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPerformance {
    pub session_id: SessionId,
    pub route: String,
    pub total_server_render_ms: f64,
    /// Span between the earliest and latest streaming phase marker.
    pub total_streaming_ms: f64,
    pub slowest_render: Option<Recorded<RenderEvent>>,
    pub suspense_boundary_count: usize,
    pub waterfall: Vec<WaterfallGroup>,
}

impl SessionPerformance {
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            route: session.route.clone(),
            total_server_render_ms: session.renders.iter().map(|r| r.event.duration_ms).sum(),
            total_streaming_ms: streaming_span_ms(session),
            slowest_render: slowest_render(&session.renders).cloned(),
            suspense_boundary_count: session.suspense.len(),
            waterfall: waterfall(session),
        }
    }
}

/// Performance figures for every retained session, most recent first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSnapshot {
    pub sessions: Vec<SessionPerformance>,
}

impl PerformanceSnapshot {
    #[must_use]
    pub fn from_runtime(snapshot: &RuntimeSnapshot) -> Self {
        Self {
            sessions: snapshot
                .sessions
                .iter()
                .map(SessionPerformance::from_session)
                .collect(),
        }
    }
}

fn streaming_span_ms(session: &Session) -> f64 {
    let mut stamps = session.streaming.iter().map(|s| s.event.timestamp);
    let Some(first) = stamps.next() else {
        return 0.0;
    };
    let (min, max) = stamps.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t)));
    (max - min).num_milliseconds() as f64
}

fn waterfall(session: &Session) -> Vec<WaterfallGroup> {
    let fetches = session
        .fetches
        .iter()
        .map(|f| WaterfallEntry {
            id: f.id.clone(),
            label: format!("{} {}", f.event.method, f.event.url),
            started_at: f.event.started_at,
            duration_ms: f.event.duration_ms,
        })
        .collect();

    let actions = session
        .server_actions
        .iter()
        .map(|a| WaterfallEntry {
            id: a.id.clone(),
            label: a.event.name.clone(),
            started_at: a.event.started_at,
            duration_ms: a.event.execution_ms,
        })
        .collect();

    let renders = session
        .renders
        .iter()
        .map(|r| WaterfallEntry {
            id: r.id.clone(),
            label: r.event.label().to_string(),
            started_at: r.event.started_at,
            duration_ms: r.event.duration_ms,
        })
        .collect();

    [
        WaterfallGroup::new(WaterfallKind::Fetch, fetches),
        WaterfallGroup::new(WaterfallKind::ServerAction, actions),
        WaterfallGroup::new(WaterfallKind::Render, renders),
    ]
    .into_iter()
    .flatten()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{FetchEvent, StreamingEvent, StreamingPhase};
    use chrono::Duration;

    fn session() -> Session {
        Session::new(SessionId::new("session_perf"), "/feed")
    }

    #[test]
    fn test_empty_session_is_neutral() {
        let perf = SessionPerformance::from_session(&session());
        assert_eq!(perf.total_server_render_ms, 0.0);
        assert_eq!(perf.total_streaming_ms, 0.0);
        assert!(perf.slowest_render.is_none());
        assert!(perf.waterfall.is_empty());
    }

    #[test]
    fn test_render_totals_and_slowest() {
        let mut s = session();
        for (i, d) in [40.0, 120.0, 15.0].into_iter().enumerate() {
            s.renders.push(Recorded::new(
                EventId::new(format!("render_{i}")),
                RenderEvent::new(Some(format!("C{i}")), d),
            ));
        }
        let perf = SessionPerformance::from_session(&s);
        assert_eq!(perf.total_server_render_ms, 175.0);
        assert_eq!(perf.slowest_render.unwrap().event.label(), "C1");
    }

    #[test]
    fn test_streaming_span() {
        let mut s = session();
        let start = Utc::now();
        let phases = [
            (StreamingPhase::Shell, 0),
            (StreamingPhase::Data, 120),
            (StreamingPhase::Complete, 300),
        ];
        for (i, (phase, offset)) in phases.into_iter().enumerate() {
            s.streaming.push(Recorded::new(
                EventId::new(format!("stream_{i}")),
                StreamingEvent {
                    route: None,
                    phase,
                    timestamp: start + Duration::milliseconds(offset),
                },
            ));
        }
        assert_eq!(SessionPerformance::from_session(&s).total_streaming_ms, 300.0);
    }

    #[test]
    fn test_waterfall_groups_by_kind() {
        let mut s = session();
        let mut a = FetchEvent::new("/a", "GET");
        a.duration_ms = 100.0;
        let mut b = FetchEvent::new("/b", "POST");
        b.duration_ms = 50.0;
        s.fetches.push(Recorded::new(EventId::new("fetch_a"), a));
        s.fetches.push(Recorded::new(EventId::new("fetch_b"), b));
        s.renders.push(Recorded::new(
            EventId::new("render_a"),
            RenderEvent::new(Some("Page".to_string()), 30.0),
        ));

        let groups = SessionPerformance::from_session(&s).waterfall;
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].kind, WaterfallKind::Fetch);
        assert_eq!(groups[0].total_duration_ms, 150.0);
        assert_eq!(groups[0].entries[1].label, "POST /b");
        assert_eq!(groups[1].kind, WaterfallKind::Render);
    }

    #[test]
    fn test_snapshot_covers_every_session() {
        let snapshot = RuntimeSnapshot {
            sessions: vec![session(), session()],
            active_session_id: None,
            last_updated: Utc::now(),
        };
        assert_eq!(PerformanceSnapshot::from_runtime(&snapshot).sessions.len(), 2);
    }
}
