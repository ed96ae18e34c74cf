//! Verity CLI - run multi-agent debates from the command line
//!
//! # Usage
//!
//! ```bash
//! # Debate a claim fixture and print the verdict
//! verity debate demos/reservoir.json
//!
//! # Tighter settings, machine-readable output
//! verity debate demos/reservoir.json --max-rounds 5 --threshold 0.8 --json
//!
//! # Show the effective configuration
//! verity info
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

mod commands;

use commands::{debate, info};

/// Verity - adversarial fact-checking
///
/// Runs the investigations recorded in a fixture through a multi-round
/// debate and reports the consensus verdict.
#[derive(Parser)]
#[command(
    name = "verity",
    version,
    about = "Verity CLI - multi-agent debate and consensus",
    long_about = "Verity debates a claim between evidence-gathering agents.\n\n\
                  Conflicting evidence is detected and resolved each round,\n\
                  and the session ends once the agents reach consensus."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Debate a claim fixture
    #[command(name = "debate")]
    Debate(debate::DebateArgs),

    /// Show version and effective configuration
    #[command(name = "info")]
    Info(info::InfoArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    match cli.command {
        Commands::Debate(args) => debate::run(args).await,
        Commands::Info(args) => info::run(args),
    }
}

/// Setup logging based on verbosity level
fn setup_logging(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

pub fn print_warning(msg: &str) {
    println!("{} {}", "⚠".yellow().bold(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}
