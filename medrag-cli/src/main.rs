//! `medrag`: build, inspect and serve medical reference index bundles.
//!
//! ```bash
//! medrag ingest data/ --output index.medrag
//! medrag inspect --index index.medrag
//! medrag query --index index.medrag "What are the symptoms of diabetes?"
//! PORT=8000 medrag serve --index index.medrag
//! ```

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    medrag_telemetry::init_telemetry(cli.log_format.into())?;

    let config = commands::load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Ingest(args) => commands::ingest(args, config).await,
        Command::Serve(args) => commands::serve(args, config).await,
        Command::Query(args) => commands::query(args, config).await,
        Command::Inspect(args) => commands::inspect(args),
    }
}
