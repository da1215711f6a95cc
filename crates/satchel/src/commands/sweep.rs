//! Sweep command - deletes expired entries once.

use anyhow::Result;
use clap::Args;
use console::Style;
use satchel_store::ExpirationSweeper;
use serde::Serialize;

use super::Context;

/// Arguments for the sweep command.
#[derive(Args, Debug)]
pub struct SweepArgs {}

#[derive(Debug, Serialize)]
struct SweepOutput {
    removed: usize,
}

/// Run the sweep command.
pub async fn run(_args: SweepArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let sweeper = ExpirationSweeper::new(store, ctx.config.sweeper_section().interval())?;
    let removed = sweeper.run_once().await?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&SweepOutput { removed })?);
    } else {
        let dim = Style::new().dim();
        println!("Removed {} expired entries", removed);
        if ctx.verbose && removed == 0 {
            println!("{}", dim.apply_to("Nothing had expired"));
        }
    }

    Ok(())
}
