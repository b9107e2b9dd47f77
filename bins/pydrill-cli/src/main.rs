mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pydrill-cli")]
#[command(about = "pydrill CLI - Run daily Python challenges against the embedded interpreter", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a solution file against a challenge's synthesized test cases
    Run {
        /// Path to the challenge JSON file
        #[arg(short, long)]
        challenge: PathBuf,

        /// Path to the Python solution file
        #[arg(short, long)]
        solution: PathBuf,

        /// Pretty-print the report JSON
        #[arg(long, default_value = "false")]
        pretty: bool,
    },

    /// Synthesize the test-case batch only, to validate a challenge's
    /// reference solution
    Check {
        /// Path to the challenge JSON file
        #[arg(short, long)]
        challenge: PathBuf,
    },

    /// Write a starter solution file
    New {
        /// Output path for the solution stub
        #[arg(short, long, default_value = "solve.py")]
        out: PathBuf,

        /// Overwrite the file if it already exists
        #[arg(long, default_value = "false")]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let passed = match cli.command {
        Commands::Run {
            challenge,
            solution,
            pretty,
        } => commands::run(&challenge, &solution, pretty).await?,
        Commands::Check { challenge } => commands::check(&challenge).await?,
        Commands::New { out, force } => {
            commands::new_solution(&out, force)?;
            true
        }
    };

    if !passed {
        std::process::exit(1);
    }
    Ok(())
}
