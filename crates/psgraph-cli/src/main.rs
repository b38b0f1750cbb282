//! psgraph CLI - runs parameter-server pass pipelines over JSON programs.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use psgraph_cli::{Cli, Commands};

fn main() -> Result<()> {
    // Logs go to stderr so program JSON on stdout stays clean
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("psgraph=info".parse()?))
        .init();

    let cli = Cli::parse();

    let registry = psgraph_passes::registry::init()?;
    info!(passes = registry.len(), "pass registry initialised");

    match cli.command {
        Commands::Apply(cmd) => cmd.run()?,
        Commands::List(cmd) => cmd.run()?,
    }

    Ok(())
}
