//! Sweeper command - runs the expiration sweeper until interrupted.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use satchel_store::ExpirationSweeper;
use tracing::info;

use super::{Context, format_secs};

/// Arguments for the sweeper command.
#[derive(Args, Debug)]
pub struct SweeperArgs {
    /// Seconds between sweeps (default: [sweeper] interval_secs)
    #[arg(long)]
    pub interval_secs: Option<u64>,
}

/// Run the sweeper command.
pub async fn run(args: SweeperArgs, ctx: &Context) -> Result<()> {
    let section = ctx.config.sweeper_section();
    if !section.enabled && args.interval_secs.is_none() {
        anyhow::bail!("sweeper is disabled in config; pass --interval-secs to run it anyway");
    }

    let interval = args
        .interval_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| section.interval());

    let store = ctx.open_store()?;
    let handle = ExpirationSweeper::new(store, interval)?.spawn();

    if !ctx.json_output {
        let dim = Style::new().dim();
        println!(
            "{} every {} {}",
            style("Sweeping").bold(),
            format_secs(interval),
            dim.apply_to("(Ctrl-C to stop)")
        );
    }

    tokio::signal::ctrl_c().await?;
    info!("Interrupted, stopping sweeper");
    let stats = handle.shutdown().await;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!(
            "Ran {} sweeps ({} failed), removed {} entries",
            stats.runs, stats.failures, stats.removed
        );
    }

    Ok(())
}
