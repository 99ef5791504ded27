//! devlens - query a running devlens daemon.

fn main() -> anyhow::Result<()> {
    devlens_cli::cli::run()
}
