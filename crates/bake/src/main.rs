//! Bake CLI - static site engine.
//!
//! Provides commands for:
//! - `new`: Scaffold a new site
//! - `build`: Build the site into static files
//! - `serve`: Serve the build output
//! - `render`: Render one route through the worker runtime

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{BuildArgs, NewArgs, RenderArgs, ServeArgs};
use error::CliError;
use output::Output;

/// Bake - static site engine.
#[derive(Parser)]
#[command(name = "bake", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new site.
    New(NewArgs),
    /// Build the site.
    Build(BuildArgs),
    /// Serve the build output.
    Serve(ServeArgs),
    /// Render one route through the worker runtime.
    Render(RenderArgs),
}

impl Commands {
    fn verbose(&self) -> bool {
        match self {
            Self::Build(args) => args.verbose,
            Self::Serve(args) => args.verbose,
            Self::New(_) | Self::Render(_) => false,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if cli.command.verbose() {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli.command) {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::New(args) => args.execute(),
        Commands::Build(args) => args.execute(),
        Commands::Serve(args) => runtime()?.block_on(args.execute()),
        Commands::Render(args) => runtime()?.block_on(args.execute()),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    Ok(tokio::runtime::Runtime::new()?)
}
