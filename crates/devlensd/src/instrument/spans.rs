//! Timed spans for fetches, server actions and component renders.
//!
//! A span captures the wall-clock start for the event and a monotonic
//! `Instant` for the duration. Finishing a span records exactly one event;
//! dropping it unfinished records nothing.

use std::fmt;
use std::future::Future;
use std::time::Instant;

use chrono::Utc;
use devlens_core::{
    ActionStatus, CacheResult, FetchEvent, FetchOrigin, RenderEvent, ServerActionEvent,
};

use crate::store::StoreHandle;

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

// ============================================================================
// Fetch
// ============================================================================

/// An in-flight fetch call.
#[must_use = "a span records nothing until finished"]
pub struct FetchSpan {
    store: StoreHandle,
    event: FetchEvent,
    started: Instant,
}

impl FetchSpan {
    pub fn start(store: &StoreHandle, url: impl Into<String>, method: impl Into<String>) -> Self {
        let mut event = FetchEvent::new(url, method);
        event.started_at = Utc::now();
        Self {
            store: store.clone(),
            event,
            started: Instant::now(),
        }
    }

    pub fn origin(mut self, origin: FetchOrigin) -> Self {
        self.event.origin = origin;
        self
    }

    pub fn cache_mode(mut self, mode: impl Into<String>) -> Self {
        self.event.cache_mode = Some(mode.into());
        self
    }

    /// Overrides the route; by default the active session's route is used.
    pub fn route(mut self, route: impl Into<String>) -> Self {
        self.event.route = Some(route.into());
        self
    }

    /// Records the completed request. Returns the measured duration.
    pub fn finish(mut self, status: u16, cache_result: CacheResult) -> f64 {
        let duration = elapsed_ms(self.started);
        self.event.status = Some(status);
        self.event.cache_result = cache_result;
        self.event.duration_ms = duration;
        self.store.record_fetch(self.event);
        duration
    }

    /// Records a request that failed before producing a status.
    pub fn fail(mut self, error: impl fmt::Display) -> f64 {
        let duration = elapsed_ms(self.started);
        self.event.error = Some(error.to_string());
        self.event.duration_ms = duration;
        self.store.record_fetch(self.event);
        duration
    }
}

/// Awaits `request` inside `span`, recording its outcome.
///
/// `status` extracts the HTTP status from a successful response. The result
/// of `request` is returned unchanged.
pub async fn instrument_fetch<T, E, F>(
    span: FetchSpan,
    request: F,
    status: impl FnOnce(&T) -> u16,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let result = request.await;
    match &result {
        Ok(response) => {
            span.finish(status(response), CacheResult::Unknown);
        }
        Err(e) => {
            span.fail(e);
        }
    }
    result
}

// ============================================================================
// Server Action
// ============================================================================

/// An executing server action.
#[must_use = "a span records nothing until finished"]
pub struct ServerActionSpan {
    store: StoreHandle,
    event: ServerActionEvent,
    started: Instant,
}

impl ServerActionSpan {
    pub fn start(store: &StoreHandle, name: impl Into<String>) -> Self {
        Self {
            store: store.clone(),
            event: ServerActionEvent::new(name, 0.0, ActionStatus::Success),
            started: Instant::now(),
        }
    }

    pub fn source_file(mut self, file: impl Into<String>) -> Self {
        self.event.source_file = Some(file.into());
        self
    }

    pub fn succeed(mut self) -> f64 {
        let duration = elapsed_ms(self.started);
        self.event.execution_ms = duration;
        self.store.record_server_action(self.event);
        duration
    }

    pub fn fail(mut self, message: impl fmt::Display, stack: Option<String>) -> f64 {
        let duration = elapsed_ms(self.started);
        self.event.execution_ms = duration;
        self.event.status = ActionStatus::Error;
        self.event.error_message = Some(message.to_string());
        self.event.error_stack = stack;
        self.store.record_server_action(self.event);
        duration
    }
}

// ============================================================================
// Render
// ============================================================================

/// A server component render in progress.
#[must_use = "a span records nothing until finished"]
pub struct RenderSpan {
    store: StoreHandle,
    event: RenderEvent,
    started: Instant,
}

impl RenderSpan {
    pub fn start(store: &StoreHandle, component_name: Option<String>) -> Self {
        Self {
            store: store.clone(),
            event: RenderEvent::new(component_name, 0.0),
            started: Instant::now(),
        }
    }

    pub fn source_file(mut self, file: impl Into<String>) -> Self {
        self.event.source_file = Some(file.into());
        self
    }

    pub fn is_async(mut self, is_async: bool) -> Self {
        self.event.is_async = is_async;
        self
    }

    pub fn finish(mut self) -> f64 {
        let duration = elapsed_ms(self.started);
        self.event.duration_ms = duration;
        self.store.record_render(self.event);
        duration
    }

    pub fn fail(mut self, error: impl fmt::Display) -> f64 {
        let duration = elapsed_ms(self.started);
        self.event.duration_ms = duration;
        self.event.error = Some(error.to_string());
        self.store.record_render(self.event);
        duration
    }
}
