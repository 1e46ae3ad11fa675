//! docsmith CLI.
//!
//! Provides commands for:
//! - `resolve`: List the source files selected by roots, globs and `.gitignore` rules
//! - `render`: Replace diagram blocks in markdown files with cached rendered assets

mod commands;
mod error;
mod output;

use std::future::Future;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{RenderArgs, ResolveArgs};
use error::CliError;
use output::Output;

/// docsmith - source resolution and diagram rendering for generators.
#[derive(Parser)]
#[command(name = "docsmith", version, about)]
struct Cli {
    /// Enable verbose output (info logging).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the files selected for generation.
    Resolve(ResolveArgs),
    /// Render diagram blocks in markdown files.
    Render(RenderArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Resolve(args) => block_on(args.execute()),
        Commands::Render(args) => block_on(args.execute()),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}

/// Run a command on a fresh multi-threaded runtime.
fn block_on(command: impl Future<Output = Result<(), CliError>>) -> Result<(), CliError> {
    tokio::runtime::Runtime::new()?.block_on(command)
}
