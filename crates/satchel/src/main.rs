//! Satchel - SQLite-backed session store
//!
//! Main entry point for the satchel CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{config, get, migrate, new, put, remove, stats, sweep, sweeper};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Satchel - SQLite-backed session store
#[derive(Parser)]
#[command(name = "satchel")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Load this config file instead of discovering config layers
    #[arg(long, global = true, env = "SATCHEL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Session database file (overrides [store] path)
    #[arg(long, global = true, env = "SATCHEL_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create or upgrade the session database
    Migrate(migrate::MigrateArgs),

    /// Show the live entries of a session
    Get(get::GetArgs),

    /// Replace the entries of a session
    Put(put::PutArgs),

    /// Start a session under a freshly generated identifier
    New(new::NewArgs),

    /// Remove a session and all its entries
    Remove(remove::RemoveArgs),

    /// Delete expired entries once
    Sweep(sweep::SweepArgs),

    /// Run the expiration sweeper until interrupted
    Sweeper(sweeper::SweeperArgs),

    /// Show store statistics
    Stats(stats::StatsArgs),

    /// Configuration inspection
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing: console (human-readable, stderr) + rotating JSON file
    let filter = if cli.verbose {
        "satchel=debug,satchel_store=debug,satchel_config=debug,info"
    } else {
        "satchel=info,satchel_store=warn,satchel_config=warn,warn"
    };

    let log_dir = satchel_config::xdg_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "satchel.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "satchel=trace,satchel_store=trace,satchel_config=trace,info",
                )),
        )
        .init();

    // Create context for commands
    let ctx = commands::Context::load(cli.config.as_deref(), cli.db, cli.json, cli.verbose)?;

    // Dispatch to command handlers
    match cli.command {
        Commands::Migrate(args) => migrate::run(args, &ctx).await,
        Commands::Get(args) => get::run(args, &ctx).await,
        Commands::Put(args) => put::run(args, &ctx).await,
        Commands::New(args) => new::run(args, &ctx).await,
        Commands::Remove(args) => remove::run(args, &ctx).await,
        Commands::Sweep(args) => sweep::run(args, &ctx).await,
        Commands::Sweeper(args) => sweeper::run(args, &ctx).await,
        Commands::Stats(args) => stats::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
