//! devlensd - runtime telemetry daemon.

fn main() -> anyhow::Result<()> {
    devlensd::cli::run()
}
