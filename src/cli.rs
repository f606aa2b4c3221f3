//! CLI definition using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;

use clap::Parser;

/// sessionflow - workflow session coordinator
#[derive(Parser, Debug)]
#[command(name = "sessionflow")]
#[command(version)]
#[command(about = "Runs queued research sessions under per-session locks and alerts on backlog or failures")]
#[command(
    long_about = "sessionflow drains the session work queue through the step pipeline, broadcasts lifecycle events, persists session state and watches queue depth and step failure rate."
)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Pipeline graph definition (.json or .toml); defaults to the stock pipeline
    #[arg(short, long)]
    pub graph: Option<PathBuf>,

    /// Topic to queue at startup (repeatable)
    #[arg(short, long = "topic")]
    pub topics: Vec<String>,
}
