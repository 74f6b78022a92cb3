//! patchwire CLI - check, inspect, and render unit declarations.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "patchwire")]
#[command(author, version, about = "patchwire unit declaration tool", long_about = None)]
struct Cli {
    /// Log at debug level (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List unit kinds and their parameters
    Units(commands::units::UnitsArgs),

    /// Write a default declaration for a unit kind
    Init(commands::init::InitArgs),

    /// Validate a unit declaration
    Check(commands::check::CheckArgs),

    /// Print the modulation routing of a unit declaration
    Routes(commands::routes::RoutesArgs),

    /// Render a unit offline for a number of blocks
    Render(commands::render::RenderArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Units(args) => commands::units::run(args),
        Commands::Init(args) => commands::init::run(args),
        Commands::Check(args) => commands::check::run(args),
        Commands::Routes(args) => commands::routes::run(args),
        Commands::Render(args) => commands::render::run(args),
    }
}
