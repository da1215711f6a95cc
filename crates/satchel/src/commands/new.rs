//! New command - starts a session under a generated identifier.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use uuid::Uuid;

use super::{Context, parse_entry};

/// Arguments for the new command.
#[derive(Args, Debug)]
pub struct NewArgs {
    /// Initial entries as KEY=VALUE
    #[arg(required = true, value_parser = parse_entry)]
    pub entries: Vec<(String, String)>,
}

#[derive(Debug, Serialize)]
struct NewOutput {
    session_id: String,
}

/// Run the new command.
pub async fn run(args: NewArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let options = ctx.config.session_section().to_session_options();
    let session_id = Uuid::new_v4().to_string();

    let mut session = store.create_with_options(&session_id, &options, || true, true)?;
    for (key, value) in args.entries {
        session.set(&key, value).await?;
    }
    session.commit().await?;

    if ctx.json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&NewOutput { session_id })?
        );
    } else {
        // Bare id on stdout so scripts can capture it.
        println!("{}", session_id);
    }

    Ok(())
}
