//! Signup CLI - collection setup and maintenance tools.
//!
//! # Usage
//!
//! ```bash
//! # Create the schema, collections and indexes
//! signup-cli migrate
//!
//! # Delete pending signups untouched for more than an hour
//! signup-cli prune --older-than-minutes 60
//! ```
//!
//! # Commands
//!
//! - `migrate` - Create the signup schema, collections and indexes
//! - `prune` - Delete abandoned pending signups

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "signup-cli")]
#[command(author, version, about = "Signup service CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the schema, collections and indexes (idempotent)
    Migrate,
    /// Delete pending signups that have not been updated recently
    Prune {
        /// Age threshold in minutes, measured from the last update
        #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u32).range(1..))]
        older_than_minutes: u32,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Prune { older_than_minutes } => {
            commands::prune::run(older_than_minutes).await?;
        }
    }
    Ok(())
}
