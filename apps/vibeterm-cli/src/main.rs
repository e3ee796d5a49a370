//! VibeTerm CLI binary entry point.
//!
//! Parses command-line arguments with clap, initializes tracing (file only
//! for the interactive commands), and dispatches via [`Cli::run`].

mod cli;
mod logging;
mod shell;
mod tui;

use anyhow::Result;
use clap::Parser;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_root = logging::default_log_root();

    // Clean old logs (best-effort, before tracing is initialized).
    logging::cleanup_old_logs(&log_root);

    let _guard = logging::init_tracing(
        &log_root,
        cli.command.name(),
        cli.command.is_interactive(),
    )?;

    cli.run().await
}
