//! Command-line front end for the tabstore storage layer.

mod inspect;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tabstore", about = "Inspect chunked binary-table containers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a container file and list its tables
    Inspect {
        /// Path to the container file
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Inspect { file } => inspect::print_summary(&file),
    }
}
