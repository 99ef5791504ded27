//! Integration tests for the store actor and the instrumentation adapters.
//!
//! Everything goes through the public `StoreHandle`; records are
//! fire-and-forget and later requests observe them because both travel the
//! same command channel.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use devlens_core::{
    CacheResult, CaptureSource, ErrorReport, FetchOrigin, LogLevel, LogReport, StreamingPhase,
};
use devlensd::instrument::{
    instrument_fetch, FetchSpan, HookRegistry, RenderSpan, ServerActionSpan, StreamingTracker,
    SuspenseTracker,
};
use devlensd::store::{spawn_store, StoreEvent, StoreLimits};

fn limits(max_sessions: usize, max_errors: usize, max_logs: usize) -> StoreLimits {
    StoreLimits {
        max_sessions,
        max_errors,
        max_logs,
    }
}

// ============================================================================
// Session lifecycle
// ============================================================================

#[tokio::test]
async fn test_begin_session_ends_previous() {
    let store = spawn_store(StoreLimits::default());

    let first = store.begin_session("/").await.unwrap();
    let second = store.begin_session("/about").await.unwrap();
    assert_ne!(first, second);

    let snapshot = store.runtime_snapshot().await.unwrap();
    assert_eq!(snapshot.sessions.len(), 2);
    assert_eq!(snapshot.active_session_id.as_ref(), Some(&second));
    // most recent first
    assert_eq!(snapshot.sessions[0].route, "/about");
    assert!(snapshot.sessions[1].ended_at.is_some());
}

#[tokio::test]
async fn test_oldest_sessions_evicted() {
    let store = spawn_store(limits(3, 10, 10));

    for i in 0..5 {
        store.begin_session(format!("/{i}")).await.unwrap();
    }

    let snapshot = store.runtime_snapshot().await.unwrap();
    let routes: Vec<_> = snapshot.sessions.iter().map(|s| s.route.as_str()).collect();
    assert_eq!(routes, vec!["/4", "/3", "/2"]);
}

#[tokio::test]
async fn test_records_without_session_are_dropped() {
    let store = spawn_store(StoreLimits::default());

    FetchSpan::start(&store, "/api/x", "GET").finish(200, CacheResult::Miss);

    let snapshot = store.runtime_snapshot().await.unwrap();
    assert!(snapshot.sessions.is_empty());
}

#[tokio::test]
async fn test_snapshot_is_isolated_from_later_records() {
    let store = spawn_store(StoreLimits::default());
    store.begin_session("/").await.unwrap();

    let before = store.runtime_snapshot().await.unwrap();
    FetchSpan::start(&store, "/api/x", "GET").finish(200, CacheResult::Hit);
    let after = store.runtime_snapshot().await.unwrap();

    assert!(before.sessions[0].fetches.is_empty());
    assert_eq!(after.sessions[0].fetches.len(), 1);
}

// ============================================================================
// Instrumentation adapters
// ============================================================================

#[tokio::test]
async fn test_spans_record_into_active_session() {
    let store = spawn_store(StoreLimits::default());
    store.begin_session("/dashboard").await.unwrap();

    FetchSpan::start(&store, "https://api.example.com/stats", "get")
        .origin(FetchOrigin::ServerComponent)
        .cache_mode("force-cache")
        .finish(200, CacheResult::Hit);
    ServerActionSpan::start(&store, "saveWidget")
        .source_file("app/dashboard/actions.ts")
        .fail("quota exceeded", None);
    RenderSpan::start(&store, Some("Dashboard".to_string()))
        .is_async(true)
        .finish();

    let snapshot = store.runtime_snapshot().await.unwrap();
    let session = snapshot.active_session().unwrap();

    assert_eq!(session.fetches.len(), 1);
    let fetch = &session.fetches[0].event;
    assert_eq!(fetch.route.as_deref(), Some("/dashboard"));
    assert_eq!(fetch.status, Some(200));
    assert_eq!(fetch.cache_result, CacheResult::Hit);

    assert_eq!(session.server_actions.len(), 1);
    assert!(session.server_actions[0].event.is_failure());

    assert_eq!(session.renders.len(), 1);
    assert!(session.renders[0].event.is_async);
}

#[tokio::test]
async fn test_instrument_fetch_passes_result_through() {
    let store = spawn_store(StoreLimits::default());
    store.begin_session("/").await.unwrap();

    let ok: Result<u16, String> = instrument_fetch(
        FetchSpan::start(&store, "/api/ok", "GET"),
        async { Ok(204) },
        |status| *status,
    )
    .await;
    assert_eq!(ok, Ok(204));

    let err: Result<u16, String> = instrument_fetch(
        FetchSpan::start(&store, "/api/down", "GET"),
        async { Err("connection refused".to_string()) },
        |status| *status,
    )
    .await;
    assert!(err.is_err());

    let snapshot = store.runtime_snapshot().await.unwrap();
    let fetches = &snapshot.sessions[0].fetches;
    assert_eq!(fetches.len(), 2);
    assert_eq!(fetches[0].event.status, Some(204));
    assert_eq!(fetches[1].event.error.as_deref(), Some("connection refused"));
}

#[tokio::test]
async fn test_suspense_and_streaming_trackers() {
    let store = spawn_store(StoreLimits::default());
    store.begin_session("/feed").await.unwrap();

    let suspense = SuspenseTracker::new(store.clone());
    let ok = suspense.enter(Some("Feed".to_string()));
    let broken = suspense.enter(Some("Sidebar".to_string()));
    suspense.fallback_shown(ok);
    assert!(suspense.resolve(ok));
    assert!(suspense.fail(broken, "sidebar failed"));
    assert!(!suspense.resolve(ok));
    assert_eq!(suspense.pending_count(), 0);

    let streaming = StreamingTracker::new(store.clone());
    streaming.mark(StreamingPhase::Shell);
    streaming.mark(StreamingPhase::Complete);

    let snapshot = store.runtime_snapshot().await.unwrap();
    let session = snapshot.active_session().unwrap();
    assert_eq!(session.suspense.len(), 2);
    assert!(session.suspense.iter().any(|s| s.event.is_failure()));
    assert_eq!(session.streaming.len(), 2);
    assert_eq!(session.streaming[0].event.route.as_deref(), Some("/feed"));
}

// ============================================================================
// Errors and logs
// ============================================================================

#[tokio::test]
async fn test_hooks_record_and_chain() {
    let store = spawn_store(StoreLimits::default());
    store.begin_session("/settings").await.unwrap();

    let chained = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&chained);
    let hooks = HookRegistry::new(store.clone())
        .with_previous_error_handler(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .with_previous_log_handler(|_| panic!("log sink exploded"));

    hooks.on_error(ErrorReport::new(CaptureSource::Server, "render failed"));
    hooks.on_log(LogReport::new(CaptureSource::Server, LogLevel::Info, "saved"));

    assert_eq!(chained.load(Ordering::SeqCst), 1);

    let snapshot = store.error_log_snapshot().await.unwrap();
    assert_eq!(snapshot.errors.len(), 1);
    assert_eq!(snapshot.errors[0].route.as_deref(), Some("/settings"));
    assert_eq!(snapshot.logs.len(), 1);
}

#[tokio::test]
async fn test_error_buffer_keeps_newest() {
    let store = spawn_store(limits(10, 2, 10));

    for i in 0..5 {
        store.record_error(ErrorReport::new(CaptureSource::Client, format!("e{i}")));
    }

    let snapshot = store.error_log_snapshot().await.unwrap();
    let messages: Vec<_> = snapshot.errors.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(messages, vec!["e3", "e4"]);
}

#[tokio::test]
async fn test_clear_keeps_sessions_reset_drops_all() {
    let store = spawn_store(StoreLimits::default());
    store.begin_session("/").await.unwrap();
    store.record_error(ErrorReport::new(CaptureSource::Client, "boom"));

    store.clear_errors_and_logs().await.unwrap();
    assert!(store.error_log_snapshot().await.unwrap().errors.is_empty());
    assert_eq!(store.runtime_snapshot().await.unwrap().sessions.len(), 1);

    store.set_current_route(Some("/x".to_string())).await.unwrap();
    store.reset().await.unwrap();
    assert!(store.runtime_snapshot().await.unwrap().sessions.is_empty());
    assert_eq!(store.current_route().await.unwrap(), None);
}

// ============================================================================
// Events and concurrency
// ============================================================================

#[tokio::test]
async fn test_events_published_in_order() {
    let store = spawn_store(StoreLimits::default());
    let mut events = store.subscribe();

    let first = store.begin_session("/a").await.unwrap();
    store.begin_session("/b").await.unwrap();

    match events.recv().await.unwrap() {
        StoreEvent::SessionStarted { session_id, route } => {
            assert_eq!(session_id, first);
            assert_eq!(route, "/a");
        }
        other => panic!("Expected SessionStarted, got {other:?}"),
    }
    match events.recv().await.unwrap() {
        StoreEvent::SessionFinished { session_id } => assert_eq!(session_id, first),
        other => panic!("Expected SessionFinished, got {other:?}"),
    }
    assert!(matches!(
        events.recv().await.unwrap(),
        StoreEvent::SessionStarted { .. }
    ));
}

#[tokio::test]
async fn test_concurrent_recorders() {
    let store = spawn_store(StoreLimits::default());
    store.begin_session("/").await.unwrap();

    let mut tasks = Vec::new();
    for t in 0..8 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..25 {
                FetchSpan::start(&store, format!("/api/{t}/{i}"), "GET")
                    .finish(200, CacheResult::Miss);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let snapshot = store.runtime_snapshot().await.unwrap();
    assert_eq!(snapshot.sessions[0].fetches.len(), 200);

    let ids: HashSet<_> = snapshot.sessions[0].fetches.iter().map(|f| &f.id).collect();
    assert_eq!(ids.len(), 200);
}
