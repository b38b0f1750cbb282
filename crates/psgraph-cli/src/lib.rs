//! psgraph CLI Library
//!
//! - **Apply**: run a pass pipeline over a main/startup program pair
//! - **List**: show registered passes or the default server pass order
//!
//! # Example
//!
//! ```bash
//! # Build a server program from a trainer program
//! psgraph apply --config pipeline.json --main main.json --startup startup.json --output out/
//!
//! # Show the passes a geo-mode server runs
//! psgraph list --mode geo
//! ```

pub mod commands;

use clap::{Parser, Subcommand};

pub use commands::{ApplyCommand, ListCommand, ModeArg};

/// psgraph - parameter-server graph pass pipeline
#[derive(Parser, Debug)]
#[command(name = "psgraph")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply a pass pipeline to a program pair
    Apply(ApplyCommand),

    /// List registered passes
    List(ListCommand),
}

/// Result type alias for CLI operations
pub type CliResult<T> = anyhow::Result<T>;
