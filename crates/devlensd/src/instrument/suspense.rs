//! Suspense boundary and streaming phase tracking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use devlens_core::{StreamingEvent, StreamingPhase, SuspenseEvent};
use tracing::debug;

use crate::store::StoreHandle;

/// Identifies one suspended boundary between `enter` and `resolve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SuspenseToken(u64);

#[derive(Debug)]
struct PendingBoundary {
    boundary: Option<String>,
    started_at: DateTime<Utc>,
    started: Instant,
    fallback_ms: Option<f64>,
}

/// Tracks suspense boundaries from suspension to resolution.
///
/// Each boundary produces one Suspense event when it resolves: the fallback
/// duration is the time until the fallback was shown, the content duration
/// is the remainder.
///
/// A boundary that is entered but never resolved stays pending until
/// [`SuspenseTracker::discard_pending`] is called; hosts call it when the
/// page unmounts or navigates away.
pub struct SuspenseTracker {
    store: StoreHandle,
    next_token: AtomicU64,
    pending: Mutex<HashMap<SuspenseToken, PendingBoundary>>,
}

impl SuspenseTracker {
    pub fn new(store: StoreHandle) -> Self {
        Self {
            store,
            next_token: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// A boundary suspended.
    pub fn enter(&self, boundary: Option<String>) -> SuspenseToken {
        let token = SuspenseToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.lock().insert(
            token,
            PendingBoundary {
                boundary,
                started_at: Utc::now(),
                started: Instant::now(),
                fallback_ms: None,
            },
        );
        token
    }

    /// The boundary's fallback finished rendering. Only the first call counts.
    pub fn fallback_shown(&self, token: SuspenseToken) {
        if let Some(pending) = self.lock().get_mut(&token) {
            if pending.fallback_ms.is_none() {
                pending.fallback_ms = Some(pending.started.elapsed().as_secs_f64() * 1000.0);
            }
        }
    }

    /// The boundary resolved with content. Returns false for unknown tokens.
    pub fn resolve(&self, token: SuspenseToken) -> bool {
        self.complete(token, None)
    }

    /// The boundary resolved into an error.
    pub fn fail(&self, token: SuspenseToken, error: impl Into<String>) -> bool {
        self.complete(token, Some(error.into()))
    }

    /// Boundaries entered but not yet resolved.
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Drops every unresolved boundary without recording it. Returns how
    /// many were dropped; their tokens become unknown.
    pub fn discard_pending(&self) -> usize {
        let mut pending = self.lock();
        let count = pending.len();
        pending.clear();
        if count > 0 {
            debug!(count, "Discarded unresolved suspense boundaries");
        }
        count
    }

    fn complete(&self, token: SuspenseToken, error: Option<String>) -> bool {
        let Some(pending) = self.lock().remove(&token) else {
            debug!(token = token.0, "Unknown suspense token ignored");
            return false;
        };

        let total_ms = pending.started.elapsed().as_secs_f64() * 1000.0;
        let fallback_ms = pending.fallback_ms.unwrap_or(0.0).min(total_ms);

        self.store.record_suspense(SuspenseEvent {
            route: None,
            boundary: pending.boundary,
            started_at: pending.started_at,
            resolved_at: resolved_at(pending.started_at, total_ms),
            fallback_ms,
            content_resolve_ms: total_ms - fallback_ms,
            error,
        });
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SuspenseToken, PendingBoundary>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `started_at` plus `total_ms`, clamped to `started_at` when out of range.
fn resolved_at(started_at: DateTime<Utc>, total_ms: f64) -> DateTime<Utc> {
    Some(chrono::Duration::microseconds((total_ms * 1000.0) as i64))
        .and_then(|elapsed| started_at.checked_add_signed(elapsed))
        .unwrap_or(started_at)
}

/// Records streaming phase markers.
#[derive(Clone)]
pub struct StreamingTracker {
    store: StoreHandle,
}

impl StreamingTracker {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    pub fn mark(&self, phase: StreamingPhase) {
        self.store.record_streaming(StreamingEvent::now(phase));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{spawn_store, StoreLimits};
    use std::time::Duration;

    #[tokio::test]
    async fn test_suspense_durations_split() {
        let store = spawn_store(StoreLimits::default());
        store.begin_session("/feed").await.unwrap();
        let tracker = SuspenseTracker::new(store.clone());

        let token = tracker.enter(Some("Comments".to_string()));
        tokio::time::sleep(Duration::from_millis(5)).await;
        tracker.fallback_shown(token);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(tracker.resolve(token));
        assert_eq!(tracker.pending_count(), 0);

        let snapshot = store.runtime_snapshot().await.unwrap();
        let event = &snapshot.active_session().unwrap().suspense[0].event;
        assert_eq!(event.boundary.as_deref(), Some("Comments"));
        assert!(event.fallback_ms >= 5.0);
        assert!(event.content_resolve_ms >= 5.0);
        assert!(event.resolved_at >= event.started_at);
    }

    #[tokio::test]
    async fn test_unknown_token_ignored() {
        let store = spawn_store(StoreLimits::default());
        let tracker = SuspenseTracker::new(store);
        let token = tracker.enter(None);
        assert!(tracker.resolve(token));
        assert!(!tracker.resolve(token));
        assert!(!tracker.fail(SuspenseToken(999), "nope"));
    }

    #[tokio::test]
    async fn test_failed_boundary_is_marked() {
        let store = spawn_store(StoreLimits::default());
        store.begin_session("/").await.unwrap();
        let tracker = SuspenseTracker::new(store.clone());

        let token = tracker.enter(None);
        tracker.fail(token, "fetch rejected");

        let snapshot = store.runtime_snapshot().await.unwrap();
        let event = &snapshot.active_session().unwrap().suspense[0].event;
        assert!(event.is_failure());
        assert_eq!(event.fallback_ms, 0.0);
    }

    #[tokio::test]
    async fn test_discard_pending_forgets_tokens() {
        let store = spawn_store(StoreLimits::default());
        store.begin_session("/").await.unwrap();
        let tracker = SuspenseTracker::new(store.clone());

        let token = tracker.enter(Some("Orphan".to_string()));
        tracker.enter(None);
        assert_eq!(tracker.discard_pending(), 2);
        assert_eq!(tracker.pending_count(), 0);
        assert!(!tracker.resolve(token));

        let snapshot = store.runtime_snapshot().await.unwrap();
        assert!(snapshot.active_session().unwrap().suspense.is_empty());
    }

    #[test]
    fn test_resolved_at_clamps_out_of_range() {
        let start = Utc::now();
        assert_eq!(resolved_at(start, f64::MAX), start);
        assert_eq!(
            resolved_at(start, 250.0),
            start + chrono::Duration::milliseconds(250)
        );
    }

    #[tokio::test]
    async fn test_streaming_marks() {
        let store = spawn_store(StoreLimits::default());
        store.begin_session("/").await.unwrap();
        let tracker = StreamingTracker::new(store.clone());

        tracker.mark(StreamingPhase::Shell);
        tracker.mark(StreamingPhase::Complete);

        let snapshot = store.runtime_snapshot().await.unwrap();
        let phases: Vec<_> = snapshot
            .active_session()
            .unwrap()
            .streaming
            .iter()
            .map(|s| s.event.phase)
            .collect();
        assert_eq!(phases, vec![StreamingPhase::Shell, StreamingPhase::Complete]);
    }
}
