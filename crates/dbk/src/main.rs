//! dbk CLI - DocBook to Confluence wiki importer.
//!
//! Provides commands for:
//! - `import`: Convert a DocBook bundle into a tree of wiki pages
//! - `structure`: Print the page structure of a DocBook bundle as JSON

mod commands;
mod error;
mod output;
mod store;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{ImportArgs, StructureArgs};
use output::Output;

/// dbk - DocBook to Confluence wiki importer.
#[derive(Parser)]
#[command(name = "dbk", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a DocBook bundle as wiki pages.
    Import(ImportArgs),
    /// Print the page structure of a DocBook bundle.
    Structure(StructureArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let verbose = matches!(&cli.command, Commands::Import(args) if args.verbose);
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Import(args) => args.execute(),
        Commands::Structure(args) => args.execute(),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
