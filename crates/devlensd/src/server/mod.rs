//! Unix socket server for the devlens daemon.
//!
//! The server:
//! - Listens on a Unix socket for client connections
//! - Spawns a ConnectionHandler for each client
//! - Forwards store events to subscribed clients
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   DaemonServer  │
//! │                 │
//! │  UnixListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│   StoreHandle   │
//! │   (per client)  │     │   Assembler     │
//! └─────────────────┘     └─────────────────┘
//!         │
//!         │ broadcast
//!         ▼
//! ┌─────────────────┐
//! │   subscribers   │
//! └─────────────────┘
//! ```

mod connection;

pub use connection::{
    apply_probe_event, ConnectionError, ConnectionHandler, SubscriberWriter, SubscribersMap,
    MAX_MESSAGE_SIZE, MAX_SUBSCRIBERS,
};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::UnixListener;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use devlens_core::OverlayThresholds;
use devlens_protocol::DaemonMessage;

use crate::diagnostics::DiagnosticsAssembler;
use crate::store::{StoreEvent, StoreHandle};

/// Default socket path
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/devlens.sock";

/// Everything a connection needs to answer requests.
#[derive(Clone)]
pub struct ServerContext {
    pub store: StoreHandle,
    pub diagnostics: DiagnosticsAssembler,
    pub thresholds: OverlayThresholds,
}

/// Unix socket server for the devlens daemon.
pub struct DaemonServer {
    socket_path: PathBuf,

    ctx: ServerContext,

    cancel_token: CancellationToken,

    /// Used to generate client ids
    connection_counter: AtomicU64,

    subscribers: SubscribersMap,
}

impl DaemonServer {
    pub fn new(
        socket_path: impl Into<PathBuf>,
        ctx: ServerContext,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            ctx,
            cancel_token,
            connection_counter: AtomicU64::new(0),
            subscribers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Listens for connections until the cancellation token fires.
    pub async fn run(&self) -> Result<(), ServerError> {
        let setup_err = |e: std::io::Error| ServerError::SocketSetup {
            path: self.socket_path.clone(),
            error: e.to_string(),
        };

        // Stale socket from a previous run
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(setup_err)?;
        }

        if let Some(parent) = self.socket_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(setup_err)?;
            }
        }

        let listener = UnixListener::bind(&self.socket_path).map_err(setup_err)?;

        info!(
            socket = %self.socket_path.display(),
            "Daemon server listening"
        );

        self.spawn_event_broadcaster();

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        self.cleanup().await;
        Ok(())
    }

    fn handle_connection(&self, stream: tokio::net::UnixStream, connection_number: u64) {
        let (reader, writer) = stream.into_split();
        let ctx = self.ctx.clone();
        let subscribers = Arc::clone(&self.subscribers);

        tokio::spawn(async move {
            let handler = ConnectionHandler::new(
                reader,
                writer,
                ctx,
                Arc::clone(&subscribers),
                connection_number,
            );

            if let Some(id) = handler.run().await {
                if subscribers.write().await.remove(&id).is_some() {
                    debug!(client_id = %id, "Removed disconnected subscriber");
                }
            }
        });
    }

    /// Forwards store events to every subscriber.
    fn spawn_event_broadcaster(&self) {
        let mut event_rx = self.ctx.store.subscribe();
        let subscribers = Arc::clone(&self.subscribers);
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Event broadcaster shutting down");
                        break;
                    }

                    result = event_rx.recv() => {
                        match result {
                            Ok(event) => broadcast_event(&subscribers, event).await,
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(skipped = n, "Event broadcaster lagged, skipped events");
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                debug!("Event channel closed");
                                break;
                            }
                        }
                    }
                }
            }
        });
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    async fn cleanup(&self) {
        self.subscribers.write().await.clear();

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(
                    socket = %self.socket_path.display(),
                    error = %e,
                    "Failed to remove socket file"
                );
            }
        }

        info!("Server cleanup complete");
    }
}

fn event_message(event: StoreEvent) -> DaemonMessage {
    match event {
        StoreEvent::SessionStarted { session_id, route } => {
            DaemonMessage::session_started(session_id, route)
        }
        StoreEvent::SessionFinished { session_id } => DaemonMessage::session_finished(session_id),
        StoreEvent::ErrorCaptured { error } => DaemonMessage::error_captured(*error),
    }
}

/// Writes one event to all subscribers, dropping the ones that fail.
async fn broadcast_event(subscribers: &SubscribersMap, event: StoreEvent) {
    let msg = event_message(event);

    let subs = subscribers.read().await;
    let mut failed_clients = Vec::new();

    for (client_id, writer) in subs.iter() {
        if let Err(e) = connection::write_message(writer, &msg).await {
            debug!(
                client_id = %client_id,
                error = %e,
                "Failed to send event to subscriber"
            );
            failed_clients.push(client_id.clone());
        }
    }

    drop(subs);

    if !failed_clients.is_empty() {
        let mut subs = subscribers.write().await;
        for client_id in failed_clients {
            subs.remove(&client_id);
            debug!(client_id = %client_id, "Removed failed subscriber");
        }
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to setup socket at {path}: {error}")]
    SocketSetup { path: PathBuf, error: String },

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use devlens_core::{CaptureSource, ErrorEvent, ErrorReport, SessionId};

    #[test]
    fn test_default_socket_path() {
        assert_eq!(DEFAULT_SOCKET_PATH, "/tmp/devlens.sock");
    }

    #[test]
    fn test_server_error_display() {
        let err = ServerError::SocketSetup {
            path: PathBuf::from("/tmp/test.sock"),
            error: "permission denied".to_string(),
        };
        assert!(err.to_string().contains("/tmp/test.sock"));
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn test_store_events_map_to_broadcasts() {
        let started = event_message(StoreEvent::SessionStarted {
            session_id: SessionId::new("s-1"),
            route: "/".to_string(),
        });
        assert!(started.is_broadcast());
        assert!(matches!(started, DaemonMessage::SessionStarted { .. }));

        let finished = event_message(StoreEvent::SessionFinished {
            session_id: SessionId::new("s-1"),
        });
        assert!(matches!(finished, DaemonMessage::SessionFinished { .. }));

        let mut store = devlens_core::ErrorLogStore::new();
        let error: ErrorEvent =
            store.record_error(ErrorReport::new(CaptureSource::Server, "boom"));
        let captured = event_message(StoreEvent::ErrorCaptured {
            error: Box::new(error),
        });
        assert!(matches!(captured, DaemonMessage::ErrorCaptured { .. }));
    }
}
