//! # tfvc2git CLI Entry Point
//!
//! Migrates a TFVC project history into a Git repository, reconstructing
//! branch topology from the flat per-changeset path changes Azure DevOps
//! reports.

use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use tfvc2git_cli::cli::{self, Cli};

#[tokio::main]
async fn main() {
  let cmd = Cli::parse();

  let level = match cmd.verbose {
    0 => tracing::Level::WARN,
    1 => tracing::Level::INFO,
    2 => tracing::Level::DEBUG,
    _ => tracing::Level::TRACE,
  };

  tracing_subscriber::registry()
    .with(fmt::layer())
    .with(EnvFilter::from_default_env().add_directive(level.into()))
    .init();

  debug!("tracing initialized with level: {}", level);

  if let Err(err) = cli::run(cmd).await {
    error!("{err:#}");
    std::process::exit(1);
  }
}
