//! Command-line entry point for the daemon binary.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon for the current project (foreground)
//! devlensd start
//!
//! # Start in the background for another project
//! devlensd start -d --project ~/src/shop
//!
//! # Stop the daemon
//! devlensd stop
//!
//! # Check daemon status
//! devlensd status
//!
//! # Custom socket path and debug logging
//! DEVLENS_SOCKET=/run/devlens.sock RUST_LOG=devlensd=debug devlensd start
//! ```

use std::env;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::FileConfig;
use crate::diagnostics::DiagnosticsAssembler;
use crate::server::{DaemonServer, ServerContext, DEFAULT_SOCKET_PATH};
use crate::store::spawn_store;

/// Environment variable overriding the socket path.
pub const SOCKET_ENV: &str = "DEVLENS_SOCKET";

/// devlens daemon - runtime telemetry store for a dev server
#[derive(Parser, Debug)]
#[command(name = "devlensd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        /// Project root to diagnose (defaults to the current directory)
        #[arg(long)]
        project: Option<PathBuf>,

        /// Config file (defaults to <project>/devlens.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Socket path
        #[arg(long)]
        socket: Option<PathBuf>,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
}

impl Default for Command {
    fn default() -> Self {
        Self::Start {
            daemon: false,
            project: None,
            config: None,
            socket: None,
        }
    }
}

fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("devlens")
}

fn pid_file_path() -> PathBuf {
    state_dir().join("devlensd.pid")
}

fn log_file_path() -> PathBuf {
    state_dir().join("devlensd.log")
}

fn read_pid() -> Option<u32> {
    let mut file = File::open(pid_file_path()).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

fn is_daemon_running() -> Option<u32> {
    if let Some(pid) = read_pid() {
        if is_process_running(pid) {
            return Some(pid);
        }
        // stale
        remove_pid_file();
    }
    None
}

fn stop_daemon(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let pid = i32::try_from(pid).context("PID out of range")?;
        let result = unsafe { libc::kill(pid, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {pid}");
        }
    }
    #[cfg(not(unix))]
    {
        bail!("Stop command is only supported on Unix systems");
    }
    Ok(())
}

/// `--socket`, then `$DEVLENS_SOCKET`, then the default.
pub fn resolve_socket_path(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| env::var_os(SOCKET_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH))
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("devlensd=info".parse()?)
                .add_directive("devlens_core=info".parse()?)
                .add_directive("devlens_protocol=info".parse()?),
        )
        .init();
    Ok(())
}

/// Parses arguments and runs the selected command.
pub fn run() -> Result<()> {
    let args = Args::parse();

    match args.command.unwrap_or_default() {
        Command::Start {
            daemon,
            project,
            config,
            socket,
        } => {
            if let Some(pid) = is_daemon_running() {
                eprintln!("Daemon is already running (PID {pid})");
                eprintln!("Use 'devlensd stop' to stop it first.");
                process::exit(1);
            }

            // Resolve before daemonizing; the daemon runs from `/`.
            let project_root = match project {
                Some(p) => p,
                None => env::current_dir().context("Failed to read current directory")?,
            };
            let project_root = project_root
                .canonicalize()
                .with_context(|| format!("Project root {} not found", project_root.display()))?;
            let config_path = config.unwrap_or_else(|| FileConfig::path_in(&project_root));
            let file_config = FileConfig::load_or_default(&config_path)
                .with_context(|| format!("Failed to load {}", config_path.display()))?;
            let socket_path = resolve_socket_path(socket);

            if !file_config.enabled {
                init_tracing()?;
                info!(config = %config_path.display(), "devlens disabled by config, not starting");
                return Ok(());
            }

            if daemon {
                daemonize()?;
            }

            write_pid()?;
            let result = run_daemon(project_root, file_config, socket_path);
            remove_pid_file();
            result
        }
        Command::Stop => {
            let Some(pid) = is_daemon_running() else {
                println!("Daemon is not running.");
                return Ok(());
            };

            println!("Stopping daemon (PID {pid})...");
            stop_daemon(pid)?;

            for _ in 0..50 {
                if !is_process_running(pid) {
                    println!("Daemon stopped.");
                    return Ok(());
                }
                std::thread::sleep(std::time::Duration::from_millis(100));
            }

            eprintln!("Daemon did not stop within 5 seconds.");
            process::exit(1);
        }
        Command::Status => {
            let Some(pid) = is_daemon_running() else {
                println!("Daemon is not running.");
                process::exit(1);
            };

            println!("Daemon is running (PID {pid})");
            let socket_path = resolve_socket_path(None);
            if socket_path.exists() {
                println!("Socket: {}", socket_path.display());
            }
            Ok(())
        }
    }
}

fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to create log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

#[tokio::main]
async fn run_daemon(project_root: PathBuf, config: FileConfig, socket_path: PathBuf) -> Result<()> {
    init_tracing()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        project = %project_root.display(),
        "devlens daemon starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let server = build_server(&project_root, &config, &socket_path, cancel_token);

    info!(socket = %socket_path.display(), "Starting server");

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("devlens daemon stopped");
    Ok(())
}

/// Wires the store, the diagnostics assembler and the socket server.
pub fn build_server(
    project_root: &Path,
    config: &FileConfig,
    socket_path: &Path,
    cancel_token: CancellationToken,
) -> DaemonServer {
    let limits = config.store_limits();
    let store = spawn_store(limits);
    info!(
        max_sessions = limits.max_sessions,
        max_errors = limits.max_errors,
        max_logs = limits.max_logs,
        "Telemetry store started"
    );

    let diagnostics = DiagnosticsAssembler::new(
        store.clone(),
        config.overlay_config(),
        project_root.to_path_buf(),
    );

    let ctx = ServerContext {
        store,
        diagnostics,
        thresholds: config.thresholds(),
    };
    DaemonServer::new(socket_path, ctx, cancel_token)
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_flag_wins() {
        let path = resolve_socket_path(Some(PathBuf::from("/tmp/custom.sock")));
        assert_eq!(path, PathBuf::from("/tmp/custom.sock"));
    }

    #[test]
    fn test_args_parse_start() {
        let args = Args::try_parse_from([
            "devlensd",
            "start",
            "-d",
            "--project",
            "/srv/app",
            "--socket",
            "/tmp/x.sock",
        ])
        .unwrap();
        match args.command {
            Some(Command::Start {
                daemon,
                project,
                socket,
                config,
            }) => {
                assert!(daemon);
                assert_eq!(project, Some(PathBuf::from("/srv/app")));
                assert_eq!(socket, Some(PathBuf::from("/tmp/x.sock")));
                assert!(config.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_no_subcommand_defaults_to_start() {
        let args = Args::try_parse_from(["devlensd"]).unwrap();
        assert!(matches!(
            args.command.unwrap_or_default(),
            Command::Start { daemon: false, .. }
        ));
    }

    #[test]
    fn test_pid_file_in_state_dir() {
        assert!(pid_file_path().ends_with("devlens/devlensd.pid"));
    }
}
