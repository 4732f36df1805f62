//! Undertow CLI - Command-line interface
//!
//! Runs the HTTP server and inspects local content libraries.

mod commands;

use std::path::Path;

use clap::Parser;
use undertow_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "undertow")]
#[command(about = "Content-session cache that streams partially fetched media over HTTP")]
struct Cli {
    /// Console log level; the log file always records everything
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info, global = true)]
    log_level: CliLogLevel,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_tracing_level(), Some(Path::new("logs")))?;

    commands::handle_command(cli.command).await
}
