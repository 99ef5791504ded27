//! End-to-end tests: the CLI client against a real daemon server.

use std::path::{Path, PathBuf};
use std::time::Duration;

use devlens_cli::render::{render_error_log, render_event, render_overlay};
use devlens_cli::{CliError, DaemonClient, DaemonConfig};
use devlens_core::{
    CaptureSource, ErrorReport, FetchEvent, OverlayPosition, StatusLevel,
};
use devlens_protocol::{ClientMessage, DaemonMessage, ProbeEvent};
use devlensd::cli::build_server;
use devlensd::config::FileConfig;
use tempfile::TempDir;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

const SOCKET_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

struct Daemon {
    socket_path: PathBuf,
    cancel_token: CancellationToken,
    _temp_dir: TempDir,
}

impl Daemon {
    async fn start(config_toml: &str) -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let socket_path = temp_dir.path().join("devlens.sock");
        let config = FileConfig::parse(config_toml).unwrap();
        let cancel_token = CancellationToken::new();

        let server = build_server(temp_dir.path(), &config, &socket_path, cancel_token.clone());
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        wait_for_socket(&socket_path).await;
        Self {
            socket_path,
            cancel_token,
            _temp_dir: temp_dir,
        }
    }

    fn config(&self) -> DaemonConfig {
        DaemonConfig {
            socket_path: self.socket_path.clone(),
            max_attempts: 3,
            retry_initial_delay: Duration::from_millis(10),
            ..Default::default()
        }
    }

    async fn client(&self) -> DaemonClient {
        DaemonClient::connect(&self.config()).await.unwrap()
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn wait_for_socket(path: &Path) {
    let start = tokio::time::Instant::now();
    while !path.exists() && start.elapsed() < SOCKET_WAIT_TIMEOUT {
        sleep(Duration::from_millis(10)).await;
    }
    assert!(path.exists(), "daemon socket never appeared");
}

fn failed_fetch(url: &str) -> ProbeEvent {
    let mut fetch = FetchEvent::new(url, "POST");
    fetch.status = Some(500);
    fetch.duration_ms = 35.0;
    ProbeEvent::Fetch(fetch)
}

#[tokio::test]
async fn test_connect_assigns_client_id() {
    let daemon = Daemon::start("").await;
    let client = daemon.client().await;
    assert!(client.client_id().starts_with("client-"));
}

#[tokio::test]
async fn test_connect_waits_for_late_daemon() {
    let temp_dir = tempfile::tempdir().unwrap();
    let socket_path = temp_dir.path().join("late.sock");
    let config = DaemonConfig {
        socket_path: socket_path.clone(),
        max_attempts: 10,
        retry_initial_delay: Duration::from_millis(20),
        retry_max_delay: Duration::from_millis(50),
        ..Default::default()
    };

    let cancel_token = CancellationToken::new();
    let server_token = cancel_token.clone();
    let root = temp_dir.path().to_path_buf();
    tokio::spawn(async move {
        sleep(Duration::from_millis(60)).await;
        let server = build_server(&root, &FileConfig::parse("").unwrap(), &socket_path, server_token);
        let _ = server.run().await;
    });

    let mut client = DaemonClient::connect(&config).await.unwrap();
    client.ping(7).await.unwrap();
    cancel_token.cancel();
}

#[tokio::test]
async fn test_overlay_reflects_recorded_events() {
    let daemon = Daemon::start("overlay_position = \"top-left\"\n").await;
    let mut client = daemon.client().await;

    client
        .request(ClientMessage::begin_session("/checkout"))
        .await
        .unwrap();
    client
        .send(&ClientMessage::record(failed_fetch("/api/pay")))
        .await
        .unwrap();

    let (position, view) = client.overlay().await.unwrap();
    assert_eq!(position, OverlayPosition::TopLeft);
    assert_eq!(view.status_level, StatusLevel::Error);
    assert_eq!(view.recent_fetches.len(), 1);

    let text = render_overlay(position, &view);
    assert!(text.contains("/checkout"));
    assert!(text.contains("/api/pay"));
}

#[tokio::test]
async fn test_error_log_and_reset() {
    let daemon = Daemon::start("").await;
    let mut client = daemon.client().await;

    client
        .send(&ClientMessage::record(ProbeEvent::Error(ErrorReport::new(
            CaptureSource::Client,
            "hydration mismatch",
        ))))
        .await
        .unwrap();

    let snapshot = client.error_log().await.unwrap();
    assert_eq!(snapshot.errors.len(), 1);
    assert!(render_error_log(&snapshot).contains("hydration mismatch"));

    client.reset().await.unwrap();
    assert!(client.error_log().await.unwrap().errors.is_empty());
    assert!(client.runtime().await.unwrap().sessions.is_empty());
}

#[tokio::test]
async fn test_diagnostics_export_serializes() {
    let daemon = Daemon::start("").await;
    let mut client = daemon.client().await;

    let snapshot = client.diagnostics(None).await.unwrap();
    let json = serde_json::to_value(&snapshot).unwrap();
    assert!(json.get("generatedAt").is_some());
    assert!(json.get("environment").is_some());
}

#[tokio::test]
async fn test_daemon_error_reply_maps_to_cli_error() {
    let daemon = Daemon::start("").await;
    let mut client = daemon.client().await;

    match client.request(ClientMessage::connect(None)).await {
        Err(CliError::Daemon { message, .. }) => assert!(message.contains("already connected")),
        other => panic!("Expected daemon error, got {other:?}"),
    }

    // The connection stays usable.
    client.ping(2).await.unwrap();
}

#[tokio::test]
async fn test_watch_receives_broadcasts() {
    let daemon = Daemon::start("").await;
    let mut watcher = daemon.client().await;
    watcher.subscribe().await.unwrap();

    let mut producer = daemon.client().await;
    producer
        .request(ClientMessage::begin_session("/feed"))
        .await
        .unwrap();

    let message = timeout(Duration::from_secs(2), watcher.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(message, DaemonMessage::SessionStarted { .. }));
    let line = render_event(&message).unwrap();
    assert!(line.contains("/feed"));
}

#[tokio::test]
async fn test_request_skips_interleaved_broadcasts() {
    let daemon = Daemon::start("").await;
    let mut client = daemon.client().await;
    client.subscribe().await.unwrap();

    client
        .request(ClientMessage::begin_session("/a"))
        .await
        .unwrap();
    client
        .request(ClientMessage::begin_session("/b"))
        .await
        .unwrap();

    let runtime = client.runtime().await.unwrap();
    assert_eq!(runtime.sessions.len(), 2);
}
