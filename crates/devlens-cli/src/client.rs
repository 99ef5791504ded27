//! Daemon connection client for the devlens CLI.
//!
//! `DaemonClient` handles:
//! - Connection to the daemon via Unix socket, with bounded exponential
//!   backoff while the daemon is starting
//! - The protocol handshake
//! - Request/response pairs, skipping broadcasts that arrive in between
//!
//! No `.unwrap()`, `.expect()` or `panic!()` outside tests.

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use devlens_core::{
    DiagnosticSnapshot, ErrorLogSnapshot, OverlayPosition, OverlayView, RuntimeSnapshot,
};
use devlens_protocol::{ClientMessage, DaemonMessage, ProtocolVersion};

use crate::error::{CliError, Result};

// ============================================================================
// Configuration
// ============================================================================

/// Default daemon socket path.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/devlens.sock";

/// Connection behavior for the daemon client.
///
/// # Example
///
/// ```rust
/// use devlens_cli::client::DaemonConfig;
/// use std::time::Duration;
///
/// let config = DaemonConfig {
///     socket_path: std::path::PathBuf::from("/tmp/my-devlens.sock"),
///     max_attempts: 1,
///     ..Default::default()
/// };
/// assert_eq!(config.retry_multiplier, 2.0);
/// ```
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub socket_path: PathBuf,

    /// Connection attempts before giving up (at least one is made).
    pub max_attempts: u32,

    /// Delay before the second attempt.
    pub retry_initial_delay: Duration,

    /// Cap on the delay between attempts.
    pub retry_max_delay: Duration,

    /// Backoff factor applied after each failed attempt.
    pub retry_multiplier: f64,

    /// How long to wait for a reply to a request.
    pub request_timeout: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            max_attempts: 5,
            retry_initial_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_secs(2),
            retry_multiplier: 2.0,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl DaemonConfig {
    /// Delay to wait after `delay`, capped at `retry_max_delay`.
    fn next_delay(&self, delay: Duration) -> Duration {
        delay
            .mul_f64(self.retry_multiplier.max(1.0))
            .min(self.retry_max_delay)
    }
}

// ============================================================================
// Daemon Client
// ============================================================================

/// A connected, handshaken client session with the daemon.
pub struct DaemonClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    client_id: String,
    request_timeout: Duration,
}

impl DaemonClient {
    /// Connects (with retries) and performs the handshake.
    ///
    /// # Errors
    ///
    /// `CliError::DaemonConnection` when every attempt failed,
    /// `CliError::VersionMismatch` when the daemon rejects the handshake.
    pub async fn connect(config: &DaemonConfig) -> Result<Self> {
        let stream = connect_with_retry(config).await?;
        let (reader, writer) = stream.into_split();
        let mut client = Self {
            reader: BufReader::new(reader),
            writer,
            client_id: String::new(),
            request_timeout: config.request_timeout,
        };
        client.handshake().await?;
        Ok(client)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn handshake(&mut self) -> Result<()> {
        self.send(&ClientMessage::connect(None)).await?;

        match self.recv().await? {
            DaemonMessage::Connected {
                protocol_version,
                client_id,
            } => {
                if !ProtocolVersion::CURRENT.is_compatible_with(&protocol_version) {
                    return Err(CliError::VersionMismatch {
                        client_version: ProtocolVersion::CURRENT.to_string(),
                        daemon_version: protocol_version.to_string(),
                    });
                }
                debug!(client_id, protocol_version = %protocol_version, "Handshake complete");
                self.client_id = client_id;
                Ok(())
            }
            DaemonMessage::Rejected {
                reason,
                protocol_version,
            } => {
                warn!(reason, "Daemon rejected handshake");
                Err(CliError::VersionMismatch {
                    client_version: ProtocolVersion::CURRENT.to_string(),
                    daemon_version: protocol_version.to_string(),
                })
            }
            other => Err(CliError::ProtocolError(format!(
                "unexpected response to connect: {other:?}"
            ))),
        }
    }

    /// Writes one message.
    pub async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        let json = serde_json::to_string(message)?;
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        debug!(message_type = message.message.name(), "Sent message to daemon");
        Ok(())
    }

    /// Reads the next message, broadcasts included.
    pub async fn recv(&mut self) -> Result<DaemonMessage> {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).await?;
        if read == 0 {
            return Err(CliError::ProtocolError("daemon closed the connection".into()));
        }
        Ok(serde_json::from_str(line.trim())?)
    }

    /// Sends a request and waits for its reply.
    ///
    /// Broadcasts received while waiting are skipped; an `error` reply
    /// becomes `CliError::Daemon`.
    pub async fn request(&mut self, message: ClientMessage) -> Result<DaemonMessage> {
        self.send(&message).await?;

        let deadline = Instant::now() + self.request_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let reply = timeout(remaining, self.recv()).await.map_err(|_| {
                CliError::ProtocolError(format!(
                    "no reply to {} within {:?}",
                    message.message.name(),
                    self.request_timeout
                ))
            })??;

            match reply {
                msg if msg.is_broadcast() => continue,
                DaemonMessage::Error { message, code } => {
                    return Err(CliError::Daemon { message, code });
                }
                msg => return Ok(msg),
            }
        }
    }

    pub async fn overlay(&mut self) -> Result<(OverlayPosition, OverlayView)> {
        match self.request(ClientMessage::get_overlay()).await? {
            DaemonMessage::Overlay { position, view } => Ok((position, *view)),
            other => Err(unexpected("overlay", &other)),
        }
    }

    pub async fn runtime(&mut self) -> Result<RuntimeSnapshot> {
        match self.request(ClientMessage::get_runtime()).await? {
            DaemonMessage::Runtime { snapshot } => Ok(*snapshot),
            other => Err(unexpected("runtime", &other)),
        }
    }

    pub async fn error_log(&mut self) -> Result<ErrorLogSnapshot> {
        match self.request(ClientMessage::get_error_log()).await? {
            DaemonMessage::ErrorLog { snapshot } => Ok(*snapshot),
            other => Err(unexpected("error_log", &other)),
        }
    }

    pub async fn diagnostics(&mut self, project_root: Option<PathBuf>) -> Result<DiagnosticSnapshot> {
        match self
            .request(ClientMessage::get_diagnostics(project_root))
            .await?
        {
            DaemonMessage::Diagnostics { snapshot } => Ok(*snapshot),
            other => Err(unexpected("diagnostics", &other)),
        }
    }

    pub async fn reset(&mut self) -> Result<()> {
        match self.request(ClientMessage::reset()).await? {
            DaemonMessage::Ack => Ok(()),
            other => Err(unexpected("ack", &other)),
        }
    }

    /// Round-trip time of a ping.
    pub async fn ping(&mut self, seq: u64) -> Result<Duration> {
        let start = Instant::now();
        match self.request(ClientMessage::ping(seq)).await? {
            DaemonMessage::Pong { seq: got } if got == seq => Ok(start.elapsed()),
            other => Err(unexpected("pong", &other)),
        }
    }

    /// After this, [`Self::recv`] yields broadcasts.
    pub async fn subscribe(&mut self) -> Result<()> {
        match self.request(ClientMessage::subscribe()).await? {
            DaemonMessage::Ack => Ok(()),
            other => Err(unexpected("ack", &other)),
        }
    }

    pub async fn disconnect(mut self) -> Result<()> {
        self.send(&ClientMessage::disconnect()).await
    }
}

fn unexpected(expected: &str, got: &DaemonMessage) -> CliError {
    CliError::ProtocolError(format!("expected {expected} reply, got {got:?}"))
}

/// Tries to connect up to `max_attempts` times with exponential backoff.
async fn connect_with_retry(config: &DaemonConfig) -> Result<UnixStream> {
    let attempts = config.max_attempts.max(1);
    let mut delay = config.retry_initial_delay;
    let mut last_error = String::from("socket not found");

    for attempt in 1..=attempts {
        debug!(
            attempt,
            socket_path = %config.socket_path.display(),
            "Attempting to connect to daemon"
        );

        if config.socket_path.exists() {
            match UnixStream::connect(&config.socket_path).await {
                Ok(stream) => {
                    info!(attempt, "Connected to daemon");
                    return Ok(stream);
                }
                Err(e) => {
                    debug!(attempt, error = %e, "Connection attempt failed");
                    last_error = e.to_string();
                }
            }
        } else if attempt == 1 {
            debug!(
                socket_path = %config.socket_path.display(),
                "Daemon socket not found, will retry"
            );
        }

        if attempt < attempts {
            sleep(delay).await;
            delay = config.next_delay(delay);
        }
    }

    Err(CliError::DaemonConnection {
        socket: config.socket_path.display().to_string(),
        reason: format!("{last_error} (after {attempts} attempts)"),
    })
}
