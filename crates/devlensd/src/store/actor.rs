//! Store actor - sole owner of the session and error/log stores.
//!
//! Commands are processed one at a time, which is what serializes every
//! mutation. Reads reply with owned snapshots, so a caller can never observe
//! or corrupt the actor's state.

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace};

use devlens_core::{
    ErrorLogStore, ErrorReport, LogReport, SessionEvent, SessionId, SessionStore,
};

use super::commands::{StoreCommand, StoreEvent};
use super::StoreLimits;

/// The store actor.
pub struct StoreActor {
    receiver: mpsc::Receiver<StoreCommand>,
    sessions: SessionStore,
    errors: ErrorLogStore,
    event_publisher: broadcast::Sender<StoreEvent>,
}

impl StoreActor {
    pub fn new(
        receiver: mpsc::Receiver<StoreCommand>,
        event_publisher: broadcast::Sender<StoreEvent>,
        limits: StoreLimits,
    ) -> Self {
        Self {
            receiver,
            sessions: SessionStore::with_capacity(limits.max_sessions),
            errors: ErrorLogStore::with_limits(limits.max_errors, limits.max_logs),
            event_publisher,
        }
    }

    /// Runs until every handle has been dropped.
    pub async fn run(mut self) {
        info!(max_sessions = self.sessions.max_sessions(), "Store actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(
            sessions = self.sessions.session_count(),
            errors = self.errors.error_count(),
            "Store actor stopped"
        );
    }

    fn handle_command(&mut self, cmd: StoreCommand) {
        trace!(command = cmd.name(), "Store command");
        match cmd {
            StoreCommand::BeginSession { route, respond_to } => {
                let id = self.handle_begin_session(route);
                let _ = respond_to.send(id);
            }
            StoreCommand::EndSession { respond_to } => {
                let ended = self.handle_end_session();
                let _ = respond_to.send(ended);
            }
            StoreCommand::SetCurrentRoute { route, respond_to } => {
                self.sessions.set_current_route(route);
                let _ = respond_to.send(());
            }
            StoreCommand::GetCurrentRoute { respond_to } => {
                let _ = respond_to.send(self.sessions.current_route().map(str::to_string));
            }
            StoreCommand::RecordFetch(event) => self.handle_record(*event),
            StoreCommand::RecordServerAction(event) => self.handle_record(*event),
            StoreCommand::RecordRender(event) => self.handle_record(*event),
            StoreCommand::RecordSuspense(event) => self.handle_record(*event),
            StoreCommand::RecordStreaming(event) => self.handle_record(*event),
            StoreCommand::AddTimelineEntries(entries) => {
                let count = entries.len();
                if !self.sessions.add_timeline_entries(entries) {
                    debug!(count, "No active session, timeline entries dropped");
                }
            }
            StoreCommand::RecordError(report) => self.handle_record_error(*report),
            StoreCommand::RecordLog(report) => self.handle_record_log(*report),
            StoreCommand::GetRuntimeSnapshot { respond_to } => {
                let _ = respond_to.send(self.sessions.snapshot());
            }
            StoreCommand::GetErrorLogSnapshot { respond_to } => {
                let _ = respond_to.send(self.errors.snapshot());
            }
            StoreCommand::GetSnapshots { respond_to } => {
                let _ = respond_to.send((self.sessions.snapshot(), self.errors.snapshot()));
            }
            StoreCommand::ClearErrorsAndLogs { respond_to } => {
                self.errors.clear();
                let _ = respond_to.send(());
            }
            StoreCommand::Reset { respond_to } => {
                self.handle_reset();
                let _ = respond_to.send(());
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_begin_session(&mut self, route: String) -> SessionId {
        let previous = self.sessions.active_session_id().cloned();
        let id = self.sessions.begin_session(route.clone());

        if let Some(session_id) = previous {
            self.publish(StoreEvent::SessionFinished { session_id });
        }
        self.publish(StoreEvent::SessionStarted {
            session_id: id.clone(),
            route,
        });
        id
    }

    fn handle_end_session(&mut self) -> Option<SessionId> {
        let ended = self.sessions.end_session()?;
        self.publish(StoreEvent::SessionFinished {
            session_id: ended.clone(),
        });
        Some(ended)
    }

    fn handle_record<E: SessionEvent>(&mut self, event: E) {
        if self.sessions.record(event).is_none() {
            debug!(kind = E::ID_PREFIX, "No active session, event dropped");
        }
    }

    fn handle_record_error(&mut self, mut report: ErrorReport) {
        if report.route.is_none() {
            report.route = self.current_route();
        }
        if report.session_id.is_none() {
            report.session_id = self.sessions.active_session_id().cloned();
        }

        let error = self.errors.record_error(report);
        debug!(error_id = %error.id, source = ?error.source, "Error captured");
        self.publish(StoreEvent::ErrorCaptured {
            error: Box::new(error),
        });
    }

    fn handle_record_log(&mut self, mut report: LogReport) {
        if report.route.is_none() {
            report.route = self.current_route();
        }
        if report.session_id.is_none() {
            report.session_id = self.sessions.active_session_id().cloned();
        }
        self.errors.record_log(report);
    }

    fn handle_reset(&mut self) {
        if let Some(session_id) = self.sessions.active_session_id().cloned() {
            self.publish(StoreEvent::SessionFinished { session_id });
        }
        self.sessions.clear();
        self.errors.clear();
        info!("Store reset");
    }

    /// Current-route pointer, else the active session's route.
    fn current_route(&self) -> Option<String> {
        self.sessions
            .current_route()
            .or_else(|| self.sessions.active_route())
            .map(str::to_string)
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.event_publisher.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devlens_core::{
        ActionStatus, CaptureSource, FetchEvent, LogLevel, ServerActionEvent, TimelineEntry,
        TimelineKind,
    };
    use tokio::sync::oneshot;

    fn create_actor() -> (StoreActor, broadcast::Receiver<StoreEvent>) {
        let (_cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = broadcast::channel(16);
        let actor = StoreActor::new(cmd_rx, event_tx, StoreLimits::default());
        (actor, event_rx)
    }

    fn begin(actor: &mut StoreActor, route: &str) -> SessionId {
        let (tx, mut rx) = oneshot::channel();
        actor.handle_command(StoreCommand::BeginSession {
            route: route.to_string(),
            respond_to: tx,
        });
        rx.try_recv().unwrap()
    }

    fn snapshot(actor: &mut StoreActor) -> devlens_core::RuntimeSnapshot {
        let (tx, mut rx) = oneshot::channel();
        actor.handle_command(StoreCommand::GetRuntimeSnapshot { respond_to: tx });
        rx.try_recv().unwrap()
    }

    fn errors(actor: &mut StoreActor) -> devlens_core::ErrorLogSnapshot {
        let (tx, mut rx) = oneshot::channel();
        actor.handle_command(StoreCommand::GetErrorLogSnapshot { respond_to: tx });
        rx.try_recv().unwrap()
    }

    #[tokio::test]
    async fn test_begin_session_publishes_lifecycle() {
        let (mut actor, mut events) = create_actor();

        let first = begin(&mut actor, "/");
        let second = begin(&mut actor, "/about");

        match events.recv().await.unwrap() {
            StoreEvent::SessionStarted { session_id, route } => {
                assert_eq!(session_id, first);
                assert_eq!(route, "/");
            }
            other => panic!("Expected SessionStarted, got {other:?}"),
        }
        match events.recv().await.unwrap() {
            StoreEvent::SessionFinished { session_id } => assert_eq!(session_id, first),
            other => panic!("Expected SessionFinished, got {other:?}"),
        }
        match events.recv().await.unwrap() {
            StoreEvent::SessionStarted { session_id, .. } => assert_eq!(session_id, second),
            other => panic!("Expected SessionStarted, got {other:?}"),
        }

        let snap = snapshot(&mut actor);
        assert_eq!(snap.sessions.len(), 2);
        assert_eq!(snap.active_session_id, Some(second));
    }

    #[tokio::test]
    async fn test_record_fills_route_and_drops_when_inactive() {
        let (mut actor, _events) = create_actor();

        actor.handle_command(StoreCommand::RecordFetch(Box::new(FetchEvent::new(
            "/api/early",
            "GET",
        ))));
        assert!(snapshot(&mut actor).sessions.is_empty());

        begin(&mut actor, "/blog");
        actor.handle_command(StoreCommand::RecordFetch(Box::new(FetchEvent::new(
            "/api/posts",
            "GET",
        ))));
        actor.handle_command(StoreCommand::RecordServerAction(Box::new(
            ServerActionEvent::new("publish", 12.0, ActionStatus::Success),
        )));

        let snap = snapshot(&mut actor);
        let session = snap.active_session().unwrap();
        assert_eq!(session.fetches.len(), 1);
        assert_eq!(session.fetches[0].event.route.as_deref(), Some("/blog"));
        assert_eq!(session.server_actions.len(), 1);
    }

    #[tokio::test]
    async fn test_timeline_entries_follow_active_session() {
        let (mut actor, _events) = create_actor();
        begin(&mut actor, "/");
        actor.handle_command(StoreCommand::AddTimelineEntries(vec![TimelineEntry {
            kind: TimelineKind::Navigation,
            timestamp: chrono::Utc::now(),
            duration_ms: None,
            ref_id: None,
        }]));
        let snap = snapshot(&mut actor);
        assert_eq!(snap.active_session().unwrap().timeline.len(), 1);
    }

    #[tokio::test]
    async fn test_error_gets_route_and_session_hint() {
        let (mut actor, mut events) = create_actor();
        let id = begin(&mut actor, "/checkout");
        let _ = events.recv().await;

        actor.handle_command(StoreCommand::RecordError(Box::new(ErrorReport::new(
            CaptureSource::Server,
            "boom",
        ))));

        let snap = errors(&mut actor);
        assert_eq!(snap.errors.len(), 1);
        assert_eq!(snap.errors[0].route.as_deref(), Some("/checkout"));
        assert_eq!(snap.errors[0].session_id.as_ref(), Some(&id));

        match events.recv().await.unwrap() {
            StoreEvent::ErrorCaptured { error } => assert_eq!(error.message, "boom"),
            other => panic!("Expected ErrorCaptured, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_current_route_wins_over_session_route() {
        let (mut actor, _events) = create_actor();
        begin(&mut actor, "/a");

        let (tx, _rx) = oneshot::channel();
        actor.handle_command(StoreCommand::SetCurrentRoute {
            route: Some("/b".to_string()),
            respond_to: tx,
        });
        actor.handle_command(StoreCommand::RecordLog(Box::new(LogReport::new(
            CaptureSource::Client,
            LogLevel::Warn,
            "slow image",
        ))));

        let snap = errors(&mut actor);
        assert_eq!(snap.logs[0].route.as_deref(), Some("/b"));
    }

    #[tokio::test]
    async fn test_clear_keeps_sessions_reset_drops_all() {
        let (mut actor, _events) = create_actor();
        begin(&mut actor, "/");
        actor.handle_command(StoreCommand::RecordError(Box::new(ErrorReport::new(
            CaptureSource::Client,
            "x",
        ))));

        let (tx, _rx) = oneshot::channel();
        actor.handle_command(StoreCommand::ClearErrorsAndLogs { respond_to: tx });
        assert!(errors(&mut actor).errors.is_empty());
        assert_eq!(snapshot(&mut actor).sessions.len(), 1);

        let (tx, _rx) = oneshot::channel();
        actor.handle_command(StoreCommand::Reset { respond_to: tx });
        let snap = snapshot(&mut actor);
        assert!(snap.sessions.is_empty());
        assert!(snap.active_session_id.is_none());
    }

    #[tokio::test]
    async fn test_end_session_without_active_is_noop() {
        let (mut actor, _events) = create_actor();
        let (tx, mut rx) = oneshot::channel();
        actor.handle_command(StoreCommand::EndSession { respond_to: tx });
        assert_eq!(rx.try_recv().unwrap(), None);
    }

    #[tokio::test]
    async fn test_snapshots_agree_on_same_state() {
        let (mut actor, _events) = create_actor();
        let session_id = begin(&mut actor, "/orders");
        actor.handle_command(StoreCommand::RecordError(Box::new(ErrorReport::new(
            CaptureSource::Server,
            "db timeout",
        ))));

        let (tx, mut rx) = oneshot::channel();
        actor.handle_command(StoreCommand::GetSnapshots { respond_to: tx });
        let (runtime, errors_and_logs) = rx.try_recv().unwrap();

        assert_eq!(runtime.active_session_id, Some(session_id.clone()));
        assert_eq!(errors_and_logs.errors.len(), 1);
        assert_eq!(errors_and_logs.errors[0].session_id, Some(session_id));
    }
}
