//! Connection handler for individual client connections.
//!
//! Each client connection gets its own `ConnectionHandler` that:
//! - Performs protocol version negotiation
//! - Parses incoming messages
//! - Routes requests to the store and the diagnostics assembler
//! - Writes responses (and broadcasts, once subscribed)
//!
//! Connection errors are logged and end the connection; they never take the
//! server down.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use devlens_core::build_overlay_view_with;
use devlens_protocol::{
    ClientMessage, DaemonMessage, MessageType, ProbeEvent, ProtocolVersion, RawBeacon,
};

use super::ServerContext;
use crate::store::{StoreError, StoreHandle};

/// Writer shared between the handler and the event broadcaster.
pub type SubscriberWriter = Arc<Mutex<BufWriter<OwnedWriteHalf>>>;

/// Subscribed clients, keyed by client id.
pub type SubscribersMap = Arc<RwLock<HashMap<String, SubscriberWriter>>>;

/// Maximum number of concurrent subscribers
pub const MAX_SUBSCRIBERS: usize = 10;

/// Maximum message size (1 MiB)
pub const MAX_MESSAGE_SIZE: usize = 1_048_576;

/// Read timeout for idle connections (5 minutes)
const READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

type ClientId = String;

/// Connection handler for a single client.
pub struct ConnectionHandler {
    reader: BufReader<OwnedReadHalf>,

    /// Shared with the broadcaster once the client subscribes
    writer: SubscriberWriter,

    ctx: ServerContext,

    subscribers: SubscribersMap,

    /// Assigned after handshake
    client_id: Option<ClientId>,

    subscribed: bool,

    connection_number: u64,
}

impl ConnectionHandler {
    pub fn new(
        reader: OwnedReadHalf,
        writer: OwnedWriteHalf,
        ctx: ServerContext,
        subscribers: SubscribersMap,
        connection_number: u64,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: Arc::new(Mutex::new(BufWriter::new(writer))),
            ctx,
            subscribers,
            client_id: None,
            subscribed: false,
            connection_number,
        }
    }

    /// Runs the handshake and then the message loop until the connection
    /// closes. Returns the client id so the server can drop its
    /// subscription.
    pub async fn run(mut self) -> Option<ClientId> {
        debug!(connection = self.connection_number, "New client connected");

        let handshake = match timeout(READ_TIMEOUT, self.handle_handshake()).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout),
        };
        if let Err(e) = handshake {
            warn!(
                connection = self.connection_number,
                error = %e,
                "Handshake failed"
            );
            return None;
        }
        info!(client_id = ?self.client_id, "Client handshake completed");

        let client_id = self.client_id.clone();

        if let Err(e) = self.process_messages().await {
            debug!(
                client_id = ?self.client_id,
                error = %e,
                "Connection closed"
            );
        }

        info!(client_id = ?self.client_id, "Client disconnected");
        client_id
    }

    /// Expects `connect`, checks the protocol version, answers `connected`
    /// or `rejected`.
    async fn handle_handshake(&mut self) -> Result<(), ConnectionError> {
        let msg = self.read_message().await?;

        let client_version = msg.protocol_version;
        if let Err(e) = ProtocolVersion::check_peer(&client_version) {
            warn!(
                client_version = %client_version,
                server_version = %ProtocolVersion::CURRENT,
                "Protocol version mismatch"
            );
            self.send_message(DaemonMessage::rejected(&e.to_string()))
                .await?;
            return Err(ConnectionError::VersionMismatch {
                client: client_version,
                server: ProtocolVersion::CURRENT,
            });
        }

        match msg.message {
            MessageType::Connect { client_id } => {
                let assigned_id =
                    client_id.unwrap_or_else(|| format!("client-{}", self.connection_number));
                self.client_id = Some(assigned_id.clone());
                self.send_message(DaemonMessage::connected(assigned_id))
                    .await
            }
            other => {
                self.send_message(DaemonMessage::rejected(
                    "expected connect message for handshake",
                ))
                .await?;
                Err(ConnectionError::UnexpectedMessage(other.name().to_string()))
            }
        }
    }

    async fn process_messages(&mut self) -> Result<(), ConnectionError> {
        loop {
            let msg = match timeout(READ_TIMEOUT, self.read_message()).await {
                Ok(Ok(msg)) => msg,
                Ok(Err(ConnectionError::Eof)) => {
                    debug!(client_id = ?self.client_id, "Client sent EOF");
                    return Ok(());
                }
                Ok(Err(ConnectionError::ParseError(e))) => {
                    // A bad line does not poison the stream.
                    debug!(client_id = ?self.client_id, error = %e, "Unparseable message");
                    self.send_message(DaemonMessage::error_with_code(
                        &format!("invalid message: {e}"),
                        "parse",
                    ))
                    .await?;
                    continue;
                }
                Ok(Err(e @ ConnectionError::MessageTooLarge { .. })) => {
                    warn!(client_id = ?self.client_id, error = %e, "Closing connection");
                    // The rest of the line is still unread, so the stream cannot continue.
                    let _ = self
                        .send_message(DaemonMessage::error_with_code(&e.to_string(), "too_large"))
                        .await;
                    return Err(e);
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    debug!(client_id = ?self.client_id, "Connection timed out");
                    return Err(ConnectionError::Timeout);
                }
            };

            match self.handle_message(msg).await {
                Ok(()) => {}
                Err(ConnectionError::Eof) => return Ok(()),
                Err(ConnectionError::Store(e)) => {
                    warn!(client_id = ?self.client_id, error = %e, "Store request failed");
                    self.send_message(DaemonMessage::error_with_code(&e.to_string(), e.code()))
                        .await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn handle_message(&mut self, msg: ClientMessage) -> Result<(), ConnectionError> {
        let store = self.ctx.store.clone();

        match msg.message {
            MessageType::Connect { .. } => {
                self.send_message(DaemonMessage::error("already connected"))
                    .await?;
            }

            MessageType::BeginSession { route } => {
                let session_id = store.begin_session(route).await?;
                self.send_message(DaemonMessage::session_begun(session_id))
                    .await?;
            }

            MessageType::EndSession => {
                store.end_session().await?;
                self.send_message(DaemonMessage::Ack).await?;
            }

            MessageType::SetRoute { route } => {
                store.set_current_route(route).await?;
                self.send_message(DaemonMessage::Ack).await?;
            }

            MessageType::GetRoute => {
                let route = store.current_route().await?;
                self.send_message(DaemonMessage::route(route)).await?;
            }

            MessageType::Record { event } => {
                apply_probe_event(&store, event).await?;
            }

            MessageType::ProbeBatch { events } => {
                let (accepted, rejected) = self.handle_probe_batch(events).await?;
                self.send_message(DaemonMessage::batch_accepted(accepted, rejected))
                    .await?;
            }

            MessageType::GetRuntime => {
                let snapshot = store.runtime_snapshot().await?;
                self.send_message(DaemonMessage::runtime(snapshot)).await?;
            }

            MessageType::GetErrorLog => {
                let snapshot = store.error_log_snapshot().await?;
                self.send_message(DaemonMessage::error_log(snapshot))
                    .await?;
            }

            MessageType::GetOverlay => {
                let snapshot = store.runtime_snapshot().await?;
                let view = build_overlay_view_with(&snapshot, &self.ctx.thresholds);
                let position = self.ctx.diagnostics.config().overlay_position;
                self.send_message(DaemonMessage::overlay(position, view))
                    .await?;
            }

            MessageType::GetDiagnostics { project_root } => {
                let snapshot = self
                    .ctx
                    .diagnostics
                    .build_snapshot(project_root.as_deref())
                    .await?;
                self.send_message(DaemonMessage::diagnostics(snapshot))
                    .await?;
            }

            MessageType::ScanBundles { project_root } => {
                let bundles = self
                    .ctx
                    .diagnostics
                    .scan_bundles(project_root.as_deref())
                    .await;
                self.send_message(DaemonMessage::bundles(bundles)).await?;
            }

            MessageType::ClearErrorsAndLogs => {
                store.clear_errors_and_logs().await?;
                self.send_message(DaemonMessage::Ack).await?;
            }

            MessageType::Reset => {
                store.reset().await?;
                self.send_message(DaemonMessage::Ack).await?;
            }

            MessageType::Subscribe => self.handle_subscribe().await?,

            MessageType::Unsubscribe => {
                if let Some(ref client_id) = self.client_id {
                    self.subscribers.write().await.remove(client_id);
                }
                self.subscribed = false;
                debug!(client_id = ?self.client_id, "Client unsubscribed");
                self.send_message(DaemonMessage::Ack).await?;
            }

            MessageType::Ping { seq } => {
                self.send_message(DaemonMessage::pong(seq)).await?;
            }

            MessageType::Disconnect => {
                debug!(client_id = ?self.client_id, "Client requested disconnect");
                return Err(ConnectionError::Eof);
            }
        }

        Ok(())
    }

    async fn handle_subscribe(&mut self) -> Result<(), ConnectionError> {
        let Some(client_id) = self.client_id.clone() else {
            return self
                .send_message(DaemonMessage::error("must connect before subscribing"))
                .await;
        };

        {
            let mut subs = self.subscribers.write().await;
            if subs.len() >= MAX_SUBSCRIBERS && !subs.contains_key(&client_id) {
                drop(subs);
                return self
                    .send_message(DaemonMessage::error_with_code(
                        &format!("too many subscribers (max: {MAX_SUBSCRIBERS})"),
                        "limit",
                    ))
                    .await;
            }
            subs.insert(client_id.clone(), Arc::clone(&self.writer));
        }

        self.subscribed = true;
        debug!(client_id = %client_id, "Client subscribed to events");
        self.send_message(DaemonMessage::Ack).await
    }

    /// Parses each raw beacon on its own; a bad beacon is counted and
    /// skipped.
    async fn handle_probe_batch(
        &self,
        events: Vec<serde_json::Value>,
    ) -> Result<(u32, u32), ConnectionError> {
        let mut accepted = 0u32;
        let mut rejected = 0u32;

        for raw in events {
            match RawBeacon::parse(raw) {
                Ok(event) => {
                    apply_probe_event(&self.ctx.store, event).await?;
                    accepted = accepted.saturating_add(1);
                }
                Err(e) => {
                    debug!(client_id = ?self.client_id, error = %e, "Beacon rejected");
                    rejected = rejected.saturating_add(1);
                }
            }
        }

        debug!(
            client_id = ?self.client_id,
            accepted,
            rejected,
            "Probe batch processed"
        );
        Ok((accepted, rejected))
    }

    async fn read_message(&mut self) -> Result<ClientMessage, ConnectionError> {
        let mut line = Vec::new();

        // One byte past the limit is enough to tell an oversized line apart.
        let bytes_read = (&mut self.reader)
            .take(MAX_MESSAGE_SIZE as u64 + 1)
            .read_until(b'\n', &mut line)
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        if bytes_read == 0 {
            return Err(ConnectionError::Eof);
        }

        if line.last() != Some(&b'\n') && bytes_read > MAX_MESSAGE_SIZE {
            return Err(ConnectionError::MessageTooLarge {
                size: bytes_read,
                max: MAX_MESSAGE_SIZE,
            });
        }

        let msg: ClientMessage = serde_json::from_slice(&line)
            .map_err(|e| ConnectionError::ParseError(e.to_string()))?;

        debug!(
            client_id = ?self.client_id,
            message_type = msg.message.name(),
            "Received message"
        );

        Ok(msg)
    }

    async fn send_message(&self, msg: DaemonMessage) -> Result<(), ConnectionError> {
        write_message(&self.writer, &msg).await
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }
}

/// Routes one probe event into the store.
///
/// Navigation sets the route and begins a session; unmount ends it. Data
/// events are fire-and-forget.
pub async fn apply_probe_event(store: &StoreHandle, event: ProbeEvent) -> Result<(), StoreError> {
    match event {
        ProbeEvent::Fetch(e) => store.record_fetch(e),
        ProbeEvent::ServerAction(e) => store.record_server_action(e),
        ProbeEvent::Render(e) => store.record_render(e),
        ProbeEvent::Suspense(e) => store.record_suspense(e),
        ProbeEvent::Streaming(e) => store.record_streaming(e),
        ProbeEvent::Timeline { entries } => store.add_timeline_entries(entries),
        ProbeEvent::Error(report) => store.record_error(report),
        ProbeEvent::Log(report) => store.record_log(report),
        ProbeEvent::Navigation { route } => {
            store.set_current_route(Some(route.clone())).await?;
            store.begin_session(route).await?;
        }
        ProbeEvent::Unmount => {
            store.end_session().await?;
        }
    }
    Ok(())
}

/// Writes one newline-terminated JSON message under the write timeout.
pub async fn write_message(
    writer: &SubscriberWriter,
    msg: &DaemonMessage,
) -> Result<(), ConnectionError> {
    let json =
        serde_json::to_string(msg).map_err(|e| ConnectionError::ParseError(e.to_string()))?;

    let mut writer = writer.lock().await;

    match timeout(WRITE_TIMEOUT, async {
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok::<(), std::io::Error>(())
    })
    .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
        Err(_) => Err(ConnectionError::WriteTimeout),
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Protocol version mismatch: client {client}, server {server}")]
    VersionMismatch {
        client: ProtocolVersion,
        server: ProtocolVersion,
    },

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Read timeout")]
    Timeout,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{spawn_store, StoreLimits};
    use devlens_core::{CaptureSource, ErrorReport, FetchEvent};

    #[test]
    fn test_connection_error_display() {
        let err = ConnectionError::VersionMismatch {
            client: ProtocolVersion::new(2, 0),
            server: ProtocolVersion::new(1, 0),
        };
        assert!(err.to_string().contains("2.0"));
        assert!(err.to_string().contains("1.0"));
    }

    #[test]
    fn test_message_size_error() {
        let err = ConnectionError::MessageTooLarge {
            size: 2_000_000,
            max: MAX_MESSAGE_SIZE,
        };
        assert!(err.to_string().contains("2000000"));
    }

    #[tokio::test]
    async fn test_navigation_begins_session_with_route() {
        let store = spawn_store(StoreLimits::default());
        apply_probe_event(
            &store,
            ProbeEvent::Navigation {
                route: "/cart".to_string(),
            },
        )
        .await
        .unwrap();

        assert_eq!(store.current_route().await.unwrap().as_deref(), Some("/cart"));
        let snapshot = store.runtime_snapshot().await.unwrap();
        assert_eq!(snapshot.sessions.len(), 1);
        assert_eq!(snapshot.sessions[0].route, "/cart");
    }

    #[tokio::test]
    async fn test_unmount_ends_session() {
        let store = spawn_store(StoreLimits::default());
        store.begin_session("/").await.unwrap();
        apply_probe_event(&store, ProbeEvent::Unmount).await.unwrap();

        let snapshot = store.runtime_snapshot().await.unwrap();
        assert!(snapshot.active_session().is_none());
    }

    #[tokio::test]
    async fn test_data_events_reach_store() {
        let store = spawn_store(StoreLimits::default());
        store.begin_session("/").await.unwrap();
        apply_probe_event(&store, ProbeEvent::Fetch(FetchEvent::new("/api/items", "GET")))
            .await
            .unwrap();
        apply_probe_event(
            &store,
            ProbeEvent::Error(ErrorReport::new(CaptureSource::Client, "boom")),
        )
        .await
        .unwrap();

        let runtime = store.runtime_snapshot().await.unwrap();
        assert_eq!(runtime.sessions[0].fetches.len(), 1);
        let errors = store.error_log_snapshot().await.unwrap();
        assert_eq!(errors.errors.len(), 1);
    }
}
