//! Stats command - shows store statistics.

use anyhow::Result;
use clap::Args;
use console::{Style, style};

use super::Context;

/// Arguments for the stats command.
#[derive(Args, Debug)]
pub struct StatsArgs {}

/// Run the stats command.
pub async fn run(_args: StatsArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let stats = store.stats().await?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!();
    println!("{}", style("Session Store").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    if let Some(path) = &store.config().path {
        println!("  {} {}", dim.apply_to("Database:"), path.display());
    }
    println!("  {} {}", dim.apply_to("Sessions:"), stats.sessions);
    println!("  {} {}", dim.apply_to("Entries:"), stats.entries);
    println!(
        "  {} {}",
        dim.apply_to("Expired (awaiting sweep):"),
        stats.expired_entries
    );
    println!();

    Ok(())
}
