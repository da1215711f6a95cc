//! Remove command - deletes a session and all its entries.

use anyhow::Result;
use clap::Args;
use console::Style;
use serde::Serialize;

use super::Context;

/// Arguments for the remove command.
#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Session identifier
    pub session_id: String,
}

#[derive(Debug, Serialize)]
struct RemoveOutput<'a> {
    session_id: &'a str,
    removed: bool,
}

/// Run the remove command.
pub async fn run(args: RemoveArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    store.remove(&args.session_id).await?;

    if ctx.json_output {
        let output = RemoveOutput {
            session_id: &args.session_id,
            removed: true,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let green = Style::new().green();
        println!("{} Removed session {}", green.apply_to("✓"), args.session_id);
    }

    Ok(())
}
