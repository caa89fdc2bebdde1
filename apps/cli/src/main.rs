//! JobPilot CLI: unattended job applications within a daily budget.
//!
//! Searches a job board with the configured profile, scores each posting,
//! and submits Easy Apply forms while the quota and schedule allow it.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
