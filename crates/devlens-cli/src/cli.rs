//! Command-line interface for querying a running devlens daemon.
//!
//! # Usage
//!
//! ```text
//! devlens overlay                  # overlay summary for the active session
//! devlens runtime                  # every retained session
//! devlens errors                   # captured errors and logs
//! devlens export -o report.json    # full diagnostic snapshot as JSON
//! devlens watch                    # stream session and error events
//! devlens reset                    # drop all telemetry
//! devlens ping                     # check the daemon is alive
//! ```

use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::client::{DaemonClient, DaemonConfig, DEFAULT_SOCKET_PATH};
use crate::render;

/// Environment variable overriding the daemon socket path.
pub const SOCKET_ENV: &str = "DEVLENS_SOCKET";

// ============================================================================
// CLI Arguments
// ============================================================================

/// devlens - runtime telemetry and diagnostics for your dev server
#[derive(Parser, Debug)]
#[command(name = "devlens")]
#[command(about = "Inspect runtime telemetry collected by devlensd")]
#[command(version)]
pub struct Args {
    /// Daemon socket path (default: $DEVLENS_SOCKET or /tmp/devlens.sock)
    #[arg(long, short = 's', global = true)]
    pub socket: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Show the overlay summary for the active session
    Overlay,
    /// List retained sessions and their events
    Runtime,
    /// Show captured errors and logs
    Errors,
    /// Export the full diagnostic snapshot as JSON
    Export {
        /// Write to a file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Project root to scan (default: the daemon's project)
        #[arg(long)]
        project: Option<PathBuf>,
    },
    /// Stream session and error events until interrupted
    Watch,
    /// Drop all sessions, errors and logs
    Reset,
    /// Check that the daemon responds
    Ping,
}

/// Flag, then `DEVLENS_SOCKET`, then the default path.
pub fn resolve_socket_path(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| env::var_os(SOCKET_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH))
}

/// Logs go to stderr so stdout stays clean for rendered output and exports.
fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("devlens_cli=warn".parse()?)
                .add_directive("devlens_protocol=warn".parse()?),
        )
        .with_writer(io::stderr)
        .init();
    Ok(())
}

/// Parses arguments and runs the selected command.
pub fn run() -> Result<()> {
    let args = Args::parse();
    init_tracing()?;

    let config = DaemonConfig {
        socket_path: resolve_socket_path(args.socket),
        ..Default::default()
    };
    execute(config, args.command)
}

#[tokio::main]
async fn execute(config: DaemonConfig, command: Command) -> Result<()> {
    let mut client = DaemonClient::connect(&config)
        .await
        .context("Could not reach devlensd (start it with 'devlensd start')")?;
    debug!(client_id = client.client_id(), ?command, "Running command");

    match command {
        Command::Overlay => {
            let (position, view) = client.overlay().await?;
            print!("{}", render::render_overlay(position, &view));
        }
        Command::Runtime => {
            let snapshot = client.runtime().await?;
            print!("{}", render::render_runtime(&snapshot));
        }
        Command::Errors => {
            let snapshot = client.error_log().await?;
            print!("{}", render::render_error_log(&snapshot));
        }
        Command::Export { output, project } => {
            let project = project
                .map(|p| {
                    p.canonicalize()
                        .with_context(|| format!("Invalid project root {}", p.display()))
                })
                .transpose()?;
            let snapshot = client.diagnostics(project).await?;
            let json = serde_json::to_string_pretty(&snapshot)?;

            match output {
                Some(path) => {
                    fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    eprintln!("Diagnostics written to {}", path.display());
                }
                None => {
                    let mut stdout = io::stdout().lock();
                    stdout.write_all(json.as_bytes())?;
                    stdout.write_all(b"\n")?;
                }
            }
        }
        Command::Watch => {
            watch(client).await?;
            return Ok(());
        }
        Command::Reset => {
            client.reset().await?;
            println!("Telemetry cleared");
        }
        Command::Ping => {
            let rtt = client.ping(1).await?;
            println!(
                "devlensd is alive at {} ({:.1}ms)",
                config.socket_path.display(),
                rtt.as_secs_f64() * 1000.0
            );
        }
    }

    client.disconnect().await?;
    Ok(())
}

/// Prints broadcasts until Ctrl-C or the daemon goes away.
async fn watch(mut client: DaemonClient) -> Result<()> {
    client.subscribe().await?;
    eprintln!("Watching for events (Ctrl-C to stop)");

    let cancel_token = CancellationToken::new();
    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            message = client.recv() => {
                let message = message?;
                if let Some(line) = render::render_event(&message) {
                    println!("{line}");
                }
            }
        }
    }

    client.disconnect().await?;
    Ok(())
}
