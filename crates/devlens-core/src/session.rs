//! Session entity, runtime snapshot, and the session store.
//!
//! A session is the telemetry record for one route activation. At most one
//! session is active at a time; every `record_*` call lands in that session
//! or is dropped when none is active.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use crate::event::{
    FetchEvent, Recorded, RenderEvent, ServerActionEvent, StreamingEvent, SuspenseEvent,
    TimelineEntry,
};
use crate::id::{EventId, SessionId};

/// Default cap on retained sessions (most recent first).
pub const DEFAULT_MAX_SESSIONS: usize = 50;

// ============================================================================
// Session
// ============================================================================

/// Telemetry for one route activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub route: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fetches: Vec<Recorded<FetchEvent>>,
    #[serde(default)]
    pub server_actions: Vec<Recorded<ServerActionEvent>>,
    #[serde(default)]
    pub renders: Vec<Recorded<RenderEvent>>,
    #[serde(default)]
    pub suspense: Vec<Recorded<SuspenseEvent>>,
    #[serde(default)]
    pub streaming: Vec<Recorded<StreamingEvent>>,
    #[serde(default)]
    pub timeline: Vec<TimelineEntry>,
}

impl Session {
    /// Creates an empty, active session for `route` starting now.
    pub fn new(id: SessionId, route: impl Into<String>) -> Self {
        Self {
            id,
            route: route.into(),
            started_at: Utc::now(),
            ended_at: None,
            fetches: Vec::new(),
            server_actions: Vec::new(),
            renders: Vec::new(),
            suspense: Vec::new(),
            streaming: Vec::new(),
            timeline: Vec::new(),
        }
    }

    /// Returns true while the session has not been finalized.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Total number of typed events in the session.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.fetches.len()
            + self.server_actions.len()
            + self.renders.len()
            + self.suspense.len()
            + self.streaming.len()
    }

    /// Sets the end timestamp, never earlier than the start.
    fn finalize(&mut self, now: DateTime<Utc>) {
        if self.ended_at.is_none() {
            self.ended_at = Some(now.max(self.started_at));
        }
    }
}

// ============================================================================
// Session Events
// ============================================================================

/// An event kind that can be appended to a session.
///
/// Ties each event type to its id prefix and to the session sequence that
/// stores it, so the store can record any kind through one code path.
pub trait SessionEvent: Clone {
    /// Prefix for generated ids of this kind.
    const ID_PREFIX: &'static str;

    fn route(&self) -> Option<&str>;

    fn set_route(&mut self, route: String);

    fn sequence_mut(session: &mut Session) -> &mut Vec<Recorded<Self>>;
}

macro_rules! impl_session_event {
    ($ty:ty, $prefix:literal, $field:ident) => {
        impl SessionEvent for $ty {
            const ID_PREFIX: &'static str = $prefix;

            fn route(&self) -> Option<&str> {
                self.route.as_deref()
            }

            fn set_route(&mut self, route: String) {
                self.route = Some(route);
            }

            fn sequence_mut(session: &mut Session) -> &mut Vec<Recorded<Self>> {
                &mut session.$field
            }
        }
    };
}

impl_session_event!(FetchEvent, "fetch", fetches);
impl_session_event!(ServerActionEvent, "action", server_actions);
impl_session_event!(RenderEvent, "render", renders);
impl_session_event!(SuspenseEvent, "suspense", suspense);
impl_session_event!(StreamingEvent, "stream", streaming);

// ============================================================================
// Runtime Snapshot
// ============================================================================

/// Point-in-time copy of the session store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSnapshot {
    /// Sessions, most recent first.
    pub sessions: Vec<Session>,
    pub active_session_id: Option<SessionId>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_updated: DateTime<Utc>,
}

impl RuntimeSnapshot {
    /// An empty snapshot stamped now.
    pub fn empty() -> Self {
        Self {
            sessions: Vec::new(),
            active_session_id: None,
            last_updated: Utc::now(),
        }
    }

    /// Looks up the session the snapshot marks as active.
    #[must_use]
    pub fn active_session(&self) -> Option<&Session> {
        let id = self.active_session_id.as_ref()?;
        self.sessions.iter().find(|s| &s.id == id)
    }
}

impl Default for RuntimeSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

// ============================================================================
// Session Store
// ============================================================================

/// Owns the session history and the active/current-route pointers.
///
/// Not synchronized: callers serialize access (the daemon routes every
/// operation through a single actor task).
#[derive(Debug)]
pub struct SessionStore {
    /// Most recent first.
    sessions: VecDeque<Session>,
    active: Option<SessionId>,
    current_route: Option<String>,
    last_updated: DateTime<Utc>,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_SESSIONS)
    }

    /// Creates a store retaining at most `max_sessions` sessions (minimum 1).
    pub fn with_capacity(max_sessions: usize) -> Self {
        Self {
            sessions: VecDeque::new(),
            active: None,
            current_route: None,
            last_updated: Utc::now(),
            max_sessions: max_sessions.max(1),
        }
    }

    /// Finalizes any active session and starts a new one for `route`.
    pub fn begin_session(&mut self, route: impl Into<String>) -> SessionId {
        let now = Utc::now();
        self.finalize_active(now);

        let id = SessionId::generate();
        let session = Session::new(id.clone(), route);
        debug!(session_id = %id, route = %session.route, "Session begun");

        self.sessions.push_front(session);
        self.active = Some(id.clone());

        if self.sessions.len() > self.max_sessions {
            let evicted = self.sessions.len() - self.max_sessions;
            self.sessions.truncate(self.max_sessions);
            debug!(evicted, max = self.max_sessions, "Evicted oldest sessions");
        }

        self.last_updated = now;
        id
    }

    /// Ends the active session. Returns the id that was ended, if any.
    pub fn end_session(&mut self) -> Option<SessionId> {
        let now = Utc::now();
        let ended = self.finalize_active(now);
        if ended.is_some() {
            self.last_updated = now;
        }
        ended
    }

    fn finalize_active(&mut self, now: DateTime<Utc>) -> Option<SessionId> {
        let id = self.active.take()?;
        if let Some(session) = self.sessions.iter_mut().find(|s| s.id == id) {
            session.finalize(now);
            debug!(session_id = %id, events = session.event_count(), "Session ended");
        }
        Some(id)
    }

    fn active_mut(&mut self) -> Option<&mut Session> {
        let id = self.active.as_ref()?;
        self.sessions.iter_mut().find(|s| &s.id == id)
    }

    /// Appends an event to the active session.
    ///
    /// Returns the assigned id, or `None` when no session is active and the
    /// event was dropped. An event without a route inherits the session's.
    pub fn record<E: SessionEvent>(&mut self, mut event: E) -> Option<EventId> {
        let session = self.active_mut()?;
        if event.route().is_none() {
            event.set_route(session.route.clone());
        }
        let id = EventId::generate(E::ID_PREFIX);
        E::sequence_mut(session).push(Recorded::new(id.clone(), event));
        self.last_updated = Utc::now();
        Some(id)
    }

    pub fn record_fetch(&mut self, event: FetchEvent) -> Option<EventId> {
        self.record(event)
    }

    pub fn record_server_action(&mut self, event: ServerActionEvent) -> Option<EventId> {
        self.record(event)
    }

    pub fn record_render(&mut self, event: RenderEvent) -> Option<EventId> {
        self.record(event)
    }

    pub fn record_suspense(&mut self, event: SuspenseEvent) -> Option<EventId> {
        self.record(event)
    }

    pub fn record_streaming(&mut self, event: StreamingEvent) -> Option<EventId> {
        self.record(event)
    }

    /// Appends timeline references to the active session.
    ///
    /// Returns false when no session is active and the batch was dropped.
    pub fn add_timeline_entries(&mut self, entries: Vec<TimelineEntry>) -> bool {
        let Some(session) = self.active_mut() else {
            return false;
        };
        session.timeline.extend(entries);
        self.last_updated = Utc::now();
        true
    }

    /// Returns an owned copy of the store state.
    #[must_use]
    pub fn snapshot(&self) -> RuntimeSnapshot {
        RuntimeSnapshot {
            sessions: self.sessions.iter().cloned().collect(),
            active_session_id: self.active.clone(),
            last_updated: self.last_updated,
        }
    }

    pub fn set_current_route(&mut self, route: Option<String>) {
        self.current_route = route;
    }

    #[must_use]
    pub fn current_route(&self) -> Option<&str> {
        self.current_route.as_deref()
    }

    #[must_use]
    pub fn active_session_id(&self) -> Option<&SessionId> {
        self.active.as_ref()
    }

    /// Route of the active session, if one is active.
    #[must_use]
    pub fn active_route(&self) -> Option<&str> {
        let id = self.active.as_ref()?;
        self.sessions
            .iter()
            .find(|s| &s.id == id)
            .map(|s| s.route.as_str())
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Drops all sessions and both pointers.
    pub fn clear(&mut self) {
        self.sessions.clear();
        self.active = None;
        self.current_route = None;
        self.last_updated = Utc::now();
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ActionStatus, StreamingPhase, TimelineKind};

    fn active_count(snapshot: &RuntimeSnapshot) -> usize {
        snapshot.sessions.iter().filter(|s| s.is_active()).count()
    }

    #[test]
    fn test_begin_session_creates_active_session() {
        let mut store = SessionStore::new();
        let id = store.begin_session("/dashboard");

        let snapshot = store.snapshot();
        assert_eq!(snapshot.sessions.len(), 1);
        assert_eq!(snapshot.active_session_id.as_ref(), Some(&id));
        let session = snapshot.active_session().unwrap();
        assert_eq!(session.route, "/dashboard");
        assert!(session.ended_at.is_none());
    }

    #[test]
    fn test_single_active_session_invariant() {
        let mut store = SessionStore::new();
        for i in 0..10 {
            store.begin_session(format!("/page/{i}"));
            assert_eq!(active_count(&store.snapshot()), 1);
        }

        let snapshot = store.snapshot();
        for session in snapshot.sessions.iter().skip(1) {
            let ended = session.ended_at.unwrap();
            assert!(ended >= session.started_at);
        }
    }

    #[test]
    fn test_end_session_clears_active_pointer() {
        let mut store = SessionStore::new();
        let id = store.begin_session("/");
        assert_eq!(store.end_session(), Some(id));

        let snapshot = store.snapshot();
        assert!(snapshot.active_session_id.is_none());
        assert_eq!(active_count(&snapshot), 0);
    }

    #[test]
    fn test_end_session_without_active_is_noop() {
        let mut store = SessionStore::new();
        let before = store.snapshot();
        assert_eq!(store.end_session(), None);
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_record_without_active_session_is_dropped() {
        let mut store = SessionStore::new();
        store.begin_session("/a");
        store.end_session();
        let before = store.snapshot();

        assert!(store.record_fetch(FetchEvent::new("/api", "GET")).is_none());
        assert!(store
            .record_server_action(ServerActionEvent::new("save", 5.0, ActionStatus::Success))
            .is_none());
        assert!(store.record_render(RenderEvent::new(None, 1.0)).is_none());
        assert!(store
            .record_streaming(StreamingEvent::now(StreamingPhase::Shell))
            .is_none());

        assert_eq!(store.snapshot().sessions, before.sessions);
    }

    #[test]
    fn test_record_appends_in_order_with_inherited_route() {
        let mut store = SessionStore::new();
        store.begin_session("/products");

        let first = store.record_fetch(FetchEvent::new("/api/1", "GET")).unwrap();
        let second = store.record_fetch(FetchEvent::new("/api/2", "GET")).unwrap();
        assert_ne!(first, second);

        let snapshot = store.snapshot();
        let session = snapshot.active_session().unwrap();
        let urls: Vec<&str> = session.fetches.iter().map(|f| f.event.url.as_str()).collect();
        assert_eq!(urls, vec!["/api/1", "/api/2"]);
        assert_eq!(session.fetches[0].id, first);
        assert_eq!(session.fetches[0].event.route.as_deref(), Some("/products"));
    }

    #[test]
    fn test_record_keeps_explicit_route() {
        let mut store = SessionStore::new();
        store.begin_session("/products");
        let mut fetch = FetchEvent::new("/api", "POST");
        fetch.route = Some("/api/checkout".to_string());
        store.record_fetch(fetch);

        let snapshot = store.snapshot();
        let session = snapshot.active_session().unwrap();
        assert_eq!(session.fetches[0].event.route.as_deref(), Some("/api/checkout"));
    }

    #[test]
    fn test_bounded_history_keeps_most_recent() {
        let mut store = SessionStore::new();
        let ids: Vec<SessionId> = (0..60).map(|i| store.begin_session(format!("/{i}"))).collect();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.sessions.len(), DEFAULT_MAX_SESSIONS);

        let expected: Vec<SessionId> = ids.iter().rev().take(DEFAULT_MAX_SESSIONS).cloned().collect();
        let actual: Vec<SessionId> = snapshot.sessions.iter().map(|s| s.id.clone()).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_custom_capacity() {
        let mut store = SessionStore::with_capacity(3);
        for i in 0..5 {
            store.begin_session(format!("/{i}"));
        }
        assert_eq!(store.session_count(), 3);
        assert_eq!(store.snapshot().sessions[0].route, "/4");
    }

    #[test]
    fn test_snapshot_isolation() {
        let mut store = SessionStore::new();
        store.begin_session("/");

        let mut snapshot = store.snapshot();
        snapshot.sessions.push(Session::new(SessionId::new("injected"), "/evil"));
        snapshot.sessions[0].route = "/mutated".to_string();
        snapshot.active_session_id = None;

        let fresh = store.snapshot();
        assert_eq!(fresh.sessions.len(), 1);
        assert_eq!(fresh.sessions[0].route, "/");
        assert!(fresh.active_session_id.is_some());
    }

    #[test]
    fn test_timeline_entries_require_active_session() {
        let mut store = SessionStore::new();
        let entry = TimelineEntry {
            kind: TimelineKind::Navigation,
            timestamp: Utc::now(),
            duration_ms: None,
            ref_id: None,
        };
        assert!(!store.add_timeline_entries(vec![entry.clone()]));

        store.begin_session("/");
        assert!(store.add_timeline_entries(vec![entry.clone(), entry]));
        assert_eq!(store.snapshot().sessions[0].timeline.len(), 2);
    }

    #[test]
    fn test_current_route_independent_of_sessions() {
        let mut store = SessionStore::new();
        assert_eq!(store.current_route(), None);

        store.set_current_route(Some("/settings".to_string()));
        assert_eq!(store.current_route(), Some("/settings"));

        store.begin_session("/other");
        store.end_session();
        assert_eq!(store.current_route(), Some("/settings"));
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut store = SessionStore::new();
        store.set_current_route(Some("/x".to_string()));
        store.begin_session("/x");
        store.clear();

        let snapshot = store.snapshot();
        assert!(snapshot.sessions.is_empty());
        assert!(snapshot.active_session_id.is_none());
        assert_eq!(store.current_route(), None);
    }
}
