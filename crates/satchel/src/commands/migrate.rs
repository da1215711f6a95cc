//! Migrate command - creates or upgrades the session database.

use anyhow::Result;
use clap::Args;
use console::Style;
use serde::Serialize;

use super::Context;

/// Arguments for the migrate command.
#[derive(Args, Debug)]
pub struct MigrateArgs {}

#[derive(Debug, Serialize)]
struct MigrateOutput {
    path: Option<String>,
    ready: bool,
}

/// Run the migrate command.
pub async fn run(_args: MigrateArgs, ctx: &Context) -> Result<()> {
    // Opening the store applies any pending migrations.
    let store = ctx.open_store()?;
    let path = store.config().path.as_ref().map(|p| p.display().to_string());

    if ctx.json_output {
        let output = MigrateOutput { path, ready: true };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let green = Style::new().green();
        println!(
            "{} Session database ready at {}",
            green.apply_to("✓"),
            path.as_deref().unwrap_or(":memory:")
        );
    }

    Ok(())
}
