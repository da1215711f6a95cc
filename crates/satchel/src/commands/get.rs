//! Get command - shows the live entries of one session.

use anyhow::Result;
use clap::Args;
use console::{Style, style};

use super::{Context, format_secs};

/// Arguments for the get command.
#[derive(Args, Debug)]
pub struct GetArgs {
    /// Session identifier
    pub session_id: String,

    /// Print only the value of this key
    #[arg(short, long)]
    pub key: Option<String>,
}

/// Run the get command.
pub async fn run(args: GetArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let record = store.retrieve_record(&args.session_id).await?;

    if let Some(key) = &args.key {
        let value = record.as_ref().and_then(|r| r.entries.get(key));
        if ctx.json_output {
            println!("{}", serde_json::to_string_pretty(&value)?);
        } else if let Some(value) = value {
            println!("{}", value);
        } else {
            anyhow::bail!("key '{}' not found in session '{}'", key, args.session_id);
        }
        return Ok(());
    }

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    let Some(record) = record else {
        println!("{}", dim.apply_to("Session not found or expired"));
        return Ok(());
    };

    println!();
    println!("{} {}", style("Session").bold(), record.session_id);
    println!("{}", dim.apply_to("─".repeat(40)));
    println!("  {} {}", dim.apply_to("Expires:"), record.expires_at.to_rfc3339());
    if let Some(window) = record.sliding_window {
        println!("  {} {}", dim.apply_to("Sliding:"), format_secs(window));
    }
    if let Some(at) = record.absolute_expiration {
        println!("  {} {}", dim.apply_to("Absolute:"), at.to_rfc3339());
    }
    println!();
    for (key, value) in &record.entries {
        println!("  {} = {}", style(key).cyan(), value);
    }
    println!();

    Ok(())
}
