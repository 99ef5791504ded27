//! Overlay view builder.
//!
//! Derives the compact, display-ready summary the on-page overlay polls for.
//! Pure: the same snapshot always yields the same view.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::event::{FetchEvent, Recorded, RenderEvent, ServerActionEvent};
use crate::session::{RuntimeSnapshot, Session};

/// Number of fetches / server actions shown in the overlay.
pub const RECENT_LIMIT: usize = 5;

/// Fetch duration above which the overlay shows a warning.
pub const SLOW_FETCH_THRESHOLD_MS: f64 = 1000.0;

/// Overall health of the active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    #[default]
    Ok,
    Warning,
    Error,
}

impl StatusLevel {
    /// Returns the ASCII icon for this level.
    #[must_use]
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Ok => "+",
            Self::Warning => "~",
            Self::Error => "!",
        }
    }
}

impl fmt::Display for StatusLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Thresholds used when classifying a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayThresholds {
    pub slow_fetch_ms: f64,
}

impl Default for OverlayThresholds {
    fn default() -> Self {
        Self {
            slow_fetch_ms: SLOW_FETCH_THRESHOLD_MS,
        }
    }
}

/// Display-ready summary of the active session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayView {
    pub active_session: Option<Session>,
    pub recent_fetches: Vec<Recorded<FetchEvent>>,
    pub recent_server_actions: Vec<Recorded<ServerActionEvent>>,
    pub slowest_rsc_render: Option<Recorded<RenderEvent>>,
    pub suspense_count: usize,
    pub streaming_count: usize,
    pub status_level: StatusLevel,
}

/// Builds the overlay view using the default thresholds.
#[must_use]
pub fn build_overlay_view(snapshot: &RuntimeSnapshot) -> OverlayView {
    build_overlay_view_with(snapshot, &OverlayThresholds::default())
}

/// Builds the overlay view for the snapshot's active session.
///
/// Returns the empty view (status `ok`) when no session is active or the
/// active id does not match any retained session.
#[must_use]
pub fn build_overlay_view_with(
    snapshot: &RuntimeSnapshot,
    thresholds: &OverlayThresholds,
) -> OverlayView {
    let Some(session) = snapshot.active_session() else {
        return OverlayView::default();
    };

    OverlayView {
        active_session: Some(session.clone()),
        recent_fetches: tail(&session.fetches, RECENT_LIMIT),
        recent_server_actions: tail(&session.server_actions, RECENT_LIMIT),
        slowest_rsc_render: slowest_render(&session.renders).cloned(),
        suspense_count: session.suspense.len(),
        streaming_count: session.streaming.len(),
        status_level: classify(session, thresholds),
    }
}

/// Last `n` items, in insertion order.
fn tail<T: Clone>(items: &[T], n: usize) -> Vec<T> {
    let start = items.len().saturating_sub(n);
    items.get(start..).map(<[T]>::to_vec).unwrap_or_default()
}

/// Render with the largest duration; the first one wins ties.
pub fn slowest_render(renders: &[Recorded<RenderEvent>]) -> Option<&Recorded<RenderEvent>> {
    renders.iter().fold(None, |best, candidate| match best {
        Some(current) if candidate.event.duration_ms <= current.event.duration_ms => Some(current),
        _ => Some(candidate),
    })
}

/// Classifies a single session. Errors outrank slow fetches.
#[must_use]
pub fn classify(session: &Session, thresholds: &OverlayThresholds) -> StatusLevel {
    let failed = session.server_actions.iter().any(|a| a.event.is_failure())
        || session.fetches.iter().any(|f| f.event.is_failure())
        || session.renders.iter().any(|r| r.event.is_failure())
        || session.suspense.iter().any(|s| s.event.is_failure());
    if failed {
        return StatusLevel::Error;
    }

    let slow = session
        .fetches
        .iter()
        .any(|f| f.event.duration_ms > thresholds.slow_fetch_ms);
    if slow {
        return StatusLevel::Warning;
    }

    StatusLevel::Ok
}
