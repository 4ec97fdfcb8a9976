//! ragstream: a staged retrieval-augmented answer service.
//!
//! Serves `POST /invoke`, which runs retrieval then generation and streams
//! one NDJSON record per stage event.

mod commands;
mod server;

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
