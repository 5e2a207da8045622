//! Euclid CLI — drive the remote crawl → label → score → export pipeline.
//!
//! Triggers pipeline stages on the Euclid service, shows live progress, and
//! saves exported datasets locally.

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
