//! Client interface for interacting with the StoreActor.
//!
//! `StoreHandle` is cheap to clone and is what instrumentation, the socket
//! server and the diagnostics assembler hold. Record methods never block and
//! never fail; request methods only fail when the actor is gone.

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

use devlens_core::{
    ErrorLogSnapshot, ErrorReport, FetchEvent, LogReport, RenderEvent, RuntimeSnapshot,
    ServerActionEvent, SessionId, StreamingEvent, SuspenseEvent, TimelineEntry,
};

use super::commands::{StoreCommand, StoreError, StoreEvent};

/// Handle for interacting with the store actor.
#[derive(Clone)]
pub struct StoreHandle {
    sender: mpsc::Sender<StoreCommand>,
    event_sender: broadcast::Sender<StoreEvent>,
}

impl StoreHandle {
    pub fn new(
        sender: mpsc::Sender<StoreCommand>,
        event_sender: broadcast::Sender<StoreEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> StoreCommand,
    ) -> Result<T, StoreError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|_| StoreError::ChannelClosed)?;
        rx.await.map_err(|_| StoreError::ChannelClosed)
    }

    /// Fire-and-forget send. A full or closed channel drops the command.
    fn notify(&self, cmd: StoreCommand) {
        if let Err(e) = self.sender.try_send(cmd) {
            let (reason, cmd) = match e {
                mpsc::error::TrySendError::Full(cmd) => ("full", cmd),
                mpsc::error::TrySendError::Closed(cmd) => ("closed", cmd),
            };
            debug!(command = cmd.name(), reason, "Store command dropped");
        }
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Begins a session for `route`, ending any active one first.
    ///
    /// # Errors
    ///
    /// `StoreError::ChannelClosed` if the actor has shut down.
    pub async fn begin_session(&self, route: impl Into<String>) -> Result<SessionId, StoreError> {
        let route = route.into();
        self.request(|respond_to| StoreCommand::BeginSession { route, respond_to })
            .await
    }

    /// Ends the active session, returning its id if there was one.
    ///
    /// # Errors
    ///
    /// `StoreError::ChannelClosed` if the actor has shut down.
    pub async fn end_session(&self) -> Result<Option<SessionId>, StoreError> {
        self.request(|respond_to| StoreCommand::EndSession { respond_to })
            .await
    }

    /// # Errors
    ///
    /// `StoreError::ChannelClosed` if the actor has shut down.
    pub async fn set_current_route(&self, route: Option<String>) -> Result<(), StoreError> {
        self.request(|respond_to| StoreCommand::SetCurrentRoute { route, respond_to })
            .await
    }

    /// # Errors
    ///
    /// `StoreError::ChannelClosed` if the actor has shut down.
    pub async fn current_route(&self) -> Result<Option<String>, StoreError> {
        self.request(|respond_to| StoreCommand::GetCurrentRoute { respond_to })
            .await
    }

    // ========================================================================
    // Recording (fire-and-forget)
    // ========================================================================

    pub fn record_fetch(&self, event: FetchEvent) {
        self.notify(StoreCommand::RecordFetch(Box::new(event)));
    }

    pub fn record_server_action(&self, event: ServerActionEvent) {
        self.notify(StoreCommand::RecordServerAction(Box::new(event)));
    }

    pub fn record_render(&self, event: RenderEvent) {
        self.notify(StoreCommand::RecordRender(Box::new(event)));
    }

    pub fn record_suspense(&self, event: SuspenseEvent) {
        self.notify(StoreCommand::RecordSuspense(Box::new(event)));
    }

    pub fn record_streaming(&self, event: StreamingEvent) {
        self.notify(StoreCommand::RecordStreaming(Box::new(event)));
    }

    pub fn add_timeline_entries(&self, entries: Vec<TimelineEntry>) {
        if entries.is_empty() {
            return;
        }
        self.notify(StoreCommand::AddTimelineEntries(entries));
    }

    pub fn record_error(&self, report: ErrorReport) {
        self.notify(StoreCommand::RecordError(Box::new(report)));
    }

    pub fn record_log(&self, report: LogReport) {
        self.notify(StoreCommand::RecordLog(Box::new(report)));
    }

    // ========================================================================
    // Reads and maintenance
    // ========================================================================

    /// Owned copy of the session store.
    ///
    /// # Errors
    ///
    /// `StoreError::ChannelClosed` if the actor has shut down.
    pub async fn runtime_snapshot(&self) -> Result<RuntimeSnapshot, StoreError> {
        self.request(|respond_to| StoreCommand::GetRuntimeSnapshot { respond_to })
            .await
    }

    /// Owned copy of the error and log buffers.
    ///
    /// # Errors
    ///
    /// `StoreError::ChannelClosed` if the actor has shut down.
    pub async fn error_log_snapshot(&self) -> Result<ErrorLogSnapshot, StoreError> {
        self.request(|respond_to| StoreCommand::GetErrorLogSnapshot { respond_to })
            .await
    }

    /// Runtime and error/log snapshots of the same store state.
    ///
    /// # Errors
    ///
    /// `StoreError::ChannelClosed` if the actor has shut down.
    pub async fn snapshots(&self) -> Result<(RuntimeSnapshot, ErrorLogSnapshot), StoreError> {
        self.request(|respond_to| StoreCommand::GetSnapshots { respond_to })
            .await
    }

    /// # Errors
    ///
    /// `StoreError::ChannelClosed` if the actor has shut down.
    pub async fn clear_errors_and_logs(&self) -> Result<(), StoreError> {
        self.request(|respond_to| StoreCommand::ClearErrorsAndLogs { respond_to })
            .await
    }

    /// # Errors
    ///
    /// `StoreError::ChannelClosed` if the actor has shut down.
    pub async fn reset(&self) -> Result<(), StoreError> {
        self.request(|respond_to| StoreCommand::Reset { respond_to })
            .await
    }

    /// Subscribe to session lifecycle and error events.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.event_sender.subscribe()
    }

    /// Returns `true` while the command channel is open.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}
