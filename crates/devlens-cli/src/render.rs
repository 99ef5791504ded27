//! Plain-text rendering of daemon replies for the terminal.
//!
//! Each renderer returns a `String` so callers decide where it goes and
//! tests can assert on the output directly.

use std::fmt::Write;

use chrono::{DateTime, Local, Utc};
use devlens_core::{
    CaptureSource, ErrorEvent, ErrorLogSnapshot, FetchEvent, LogEvent, LogLevel, OverlayPosition,
    OverlayView, RuntimeSnapshot, ServerActionEvent, Session, Severity,
};
use devlens_protocol::DaemonMessage;

/// Widest URL shown in fetch rows.
const URL_WIDTH: usize = 48;

/// Widest message shown in error and log rows.
const MESSAGE_WIDTH: usize = 96;

/// Renders the overlay summary.
///
/// ```text
/// [~ warning] /dashboard  (top-right)
///   fetches
///     GET  200   812.0ms  https://api.example.com/stats [hit]
///   server actions
///     saveWidget  12.0ms  error: quota exceeded
///   slowest render  Dashboard 41.0ms
///   suspense 2  streaming 1
/// ```
pub fn render_overlay(position: OverlayPosition, view: &OverlayView) -> String {
    let mut out = String::new();
    let route = view
        .active_session
        .as_ref()
        .map(|s| s.route.as_str())
        .unwrap_or("(no active session)");

    let _ = writeln!(
        out,
        "[{} {}] {}  ({})",
        view.status_level.icon(),
        view.status_level,
        route,
        position
    );

    if view.active_session.is_none() {
        return out;
    }

    if !view.recent_fetches.is_empty() {
        out.push_str("  fetches\n");
        for fetch in &view.recent_fetches {
            let _ = writeln!(out, "    {}", fetch_row(&fetch.event));
        }
    }

    if !view.recent_server_actions.is_empty() {
        out.push_str("  server actions\n");
        for action in &view.recent_server_actions {
            let _ = writeln!(out, "    {}", action_row(&action.event));
        }
    }

    if let Some(render) = &view.slowest_rsc_render {
        let _ = writeln!(
            out,
            "  slowest render  {} {}",
            render.event.label(),
            format_ms(render.event.duration_ms)
        );
    }

    let _ = writeln!(
        out,
        "  suspense {}  streaming {}",
        view.suspense_count, view.streaming_count
    );

    out
}

/// Renders every retained session, most recent first.
pub fn render_runtime(snapshot: &RuntimeSnapshot) -> String {
    if snapshot.sessions.is_empty() {
        return "No sessions recorded\n".to_string();
    }

    let mut out = String::new();
    for session in &snapshot.sessions {
        let marker = if snapshot.active_session_id.as_ref() == Some(&session.id) {
            "*"
        } else {
            " "
        };
        let _ = writeln!(out, "{marker} {}", session_header(session));

        for fetch in &session.fetches {
            let _ = writeln!(out, "    fetch   {}", fetch_row(&fetch.event));
        }
        for action in &session.server_actions {
            let _ = writeln!(out, "    action  {}", action_row(&action.event));
        }
        for render in &session.renders {
            let _ = writeln!(
                out,
                "    render  {} {}{}",
                render.event.label(),
                format_ms(render.event.duration_ms),
                if render.event.is_async { " async" } else { "" }
            );
        }
        if !session.suspense.is_empty() || !session.streaming.is_empty() {
            let _ = writeln!(
                out,
                "    suspense {}  streaming {}",
                session.suspense.len(),
                session.streaming.len()
            );
        }
    }
    out
}

/// Renders captured errors followed by logs, oldest first.
pub fn render_error_log(snapshot: &ErrorLogSnapshot) -> String {
    if snapshot.errors.is_empty() && snapshot.logs.is_empty() {
        return "No errors or logs captured\n".to_string();
    }

    let mut out = String::new();
    if !snapshot.errors.is_empty() {
        let _ = writeln!(out, "errors ({})", snapshot.errors.len());
        for error in &snapshot.errors {
            let _ = writeln!(out, "  {}", error_row(error));
        }
    }
    if !snapshot.logs.is_empty() {
        let _ = writeln!(out, "logs ({})", snapshot.logs.len());
        for log in &snapshot.logs {
            let _ = writeln!(out, "  {}", log_row(log));
        }
    }
    out
}

/// One line for a broadcast, `None` for anything else.
pub fn render_event(message: &DaemonMessage) -> Option<String> {
    match message {
        DaemonMessage::SessionStarted { session_id, route } => {
            Some(format!("session started  {route}  ({session_id})"))
        }
        DaemonMessage::SessionFinished { session_id } => {
            Some(format!("session finished ({session_id})"))
        }
        DaemonMessage::ErrorCaptured { error } => Some(format!("error  {}", error_row(error))),
        _ => None,
    }
}

fn session_header(session: &Session) -> String {
    let state = match session.ended_at {
        Some(ended) => {
            let ms = (ended - session.started_at).num_milliseconds();
            format!("ended after {ms}ms")
        }
        None => "active".to_string(),
    };
    format!(
        "{}  {}  started {}  {}",
        session.route,
        session.id,
        format_time(&session.started_at),
        state
    )
}

fn fetch_row(fetch: &FetchEvent) -> String {
    let status = fetch
        .status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "---".to_string());
    let mut row = format!(
        "{:<5}{:>4} {:>9}  {} [{}]",
        fetch.method,
        status,
        format_ms(fetch.duration_ms),
        truncate_string(&fetch.url, URL_WIDTH),
        fetch.cache_result
    );
    if let Some(error) = &fetch.error {
        let _ = write!(row, "  error: {}", truncate_string(error, MESSAGE_WIDTH));
    }
    row
}

fn action_row(action: &ServerActionEvent) -> String {
    let mut row = format!("{}  {}", action.name, format_ms(action.execution_ms));
    if action.is_failure() {
        let message = action.error_message.as_deref().unwrap_or("failed");
        let _ = write!(row, "  error: {}", truncate_string(message, MESSAGE_WIDTH));
    }
    row
}

fn error_row(error: &ErrorEvent) -> String {
    format!(
        "{} {:<7} {:<6} {}  {}",
        format_time(&error.timestamp),
        severity_label(error.severity),
        source_label(error.source),
        error.route.as_deref().unwrap_or("-"),
        truncate_string(&error.message, MESSAGE_WIDTH)
    )
}

fn log_row(log: &LogEvent) -> String {
    format!(
        "{} {:<7} {:<6} {}  {}",
        format_time(&log.timestamp),
        level_label(log.level),
        source_label(log.source),
        log.route.as_deref().unwrap_or("-"),
        truncate_string(&log.message, MESSAGE_WIDTH)
    )
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
    }
}

fn level_label(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

fn source_label(source: CaptureSource) -> &'static str {
    match source {
        CaptureSource::Client => "client",
        CaptureSource::Server => "server",
    }
}

fn format_ms(ms: f64) -> String {
    format!("{ms:.1}ms")
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%H:%M:%S%.3f").to_string()
}

/// Truncates to `max_len` characters, ending with "..." when cut.
///
/// Counts chars, not bytes, so multi-byte text is never split.
fn truncate_string(s: &str, max_len: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
