//! devlens core - telemetry types, stores and derived views
//!
//! This crate provides the in-memory telemetry engine shared between the
//! daemon (devlensd) and the CLI (devlens):
//! - `session` - session lifecycle and per-kind event recording
//! - `error_log` - bounded error and log buffers
//! - `overlay` - the overlay view builder
//! - `performance` - per-session timing summaries
//! - `diagnostics` - the exportable diagnostic document
//!
//! The stores are plain synchronous structs; callers serialize access.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod error_log;
pub mod event;
pub mod id;
pub mod overlay;
pub mod performance;
pub mod session;

// Re-exports for convenience
pub use config::{OverlayConfig, OverlayPosition};
pub use diagnostics::{
    AssetTarget, BundleAsset, BundleChunk, BundlesSnapshot, DiagnosticSnapshot, EnvironmentInfo,
    GitInfo, PlatformInfo, ProjectMetadata, RouteBundle, RouteEntry, RouteKind, RouteNode,
    RoutesSnapshot,
};
pub use error::DomainError;
pub use error_log::{
    CaptureSource, ErrorEvent, ErrorLogSnapshot, ErrorLogStore, ErrorReport, LogEvent, LogLevel,
    LogReport, Severity, DEFAULT_MAX_ERRORS, DEFAULT_MAX_LOGS,
};
pub use event::{
    ActionStatus, CacheResult, FetchEvent, FetchOrigin, Recorded, RenderEvent, ServerActionEvent,
    StreamingEvent, StreamingPhase, SuspenseEvent, TimelineEntry, TimelineKind,
};
pub use id::{EventId, SessionId};
pub use overlay::{
    build_overlay_view, build_overlay_view_with, OverlayThresholds, OverlayView, StatusLevel,
    RECENT_LIMIT, SLOW_FETCH_THRESHOLD_MS,
};
pub use performance::{
    PerformanceSnapshot, SessionPerformance, WaterfallEntry, WaterfallGroup, WaterfallKind,
};
pub use session::{
    RuntimeSnapshot, Session, SessionEvent, SessionStore, DEFAULT_MAX_SESSIONS,
};
