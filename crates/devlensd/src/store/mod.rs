//! Telemetry store using the Actor pattern.
//!
//! The session store and the error/log store live inside one actor task.
//! Every caller talks to it through a [`StoreHandle`]; commands are handled
//! strictly in arrival order.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │ Instrumentation │────▶│   StoreActor    │────▶│ Broadcast Channel│
//! │ / socket server │     │                 │     │                  │
//! └─────────────────┘     └─────────────────┘     └──────────────────┘
//!         │                       │                        │
//!         │   StoreCommand        │   StoreEvent           │
//!         │   (mpsc channel)      │   (broadcast)          │
//!         ▼                       ▼                        ▼
//!   record / begin /        SessionStore +           subscribed
//!   snapshot                ErrorLogStore            clients
//! ```
//!
//! Sessions are keyed by one process-wide active pointer. Concurrent
//! requests in the host app share it, so their events can land in each
//! other's session.

use devlens_core::{DEFAULT_MAX_ERRORS, DEFAULT_MAX_LOGS, DEFAULT_MAX_SESSIONS};
use tokio::sync::{broadcast, mpsc};

mod actor;
mod commands;
mod handle;

pub use actor::StoreActor;
pub use commands::{StoreCommand, StoreError, StoreEvent};
pub use handle::StoreHandle;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 1024;
const EVENT_BUFFER: usize = 100;

/// Capacity limits for the two stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    pub max_sessions: usize,
    pub max_errors: usize,
    pub max_logs: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_errors: DEFAULT_MAX_ERRORS,
            max_logs: DEFAULT_MAX_LOGS,
        }
    }
}

/// Spawn the store actor and return a handle for interaction.
///
/// The actor stops once every handle has been dropped. Must be called from
/// within a tokio runtime.
///
/// # Example
///
/// ```no_run
/// use devlensd::store::{spawn_store, StoreLimits};
///
/// #[tokio::main]
/// async fn main() {
///     let store = spawn_store(StoreLimits::default());
///     let _ = store.begin_session("/").await;
///     let snapshot = store.runtime_snapshot().await;
/// }
/// ```
pub fn spawn_store(limits: StoreLimits) -> StoreHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = StoreActor::new(cmd_rx, event_tx.clone(), limits);
    tokio::spawn(actor.run());

    StoreHandle::new(cmd_tx, event_tx)
}
