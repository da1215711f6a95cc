//! Put command - replaces the entries of a session.

use std::time::Duration;

use anyhow::{Result, bail};
use chrono::{DateTime, SubsecRound, Utc};
use clap::Args;
use console::Style;
use satchel_store::{Entries, ExpirationPolicy};
use serde::Serialize;

use super::{Context, parse_entry, parse_timestamp};

/// Arguments for the put command.
#[derive(Args, Debug)]
pub struct PutArgs {
    /// Session identifier
    pub session_id: String,

    /// Entries as KEY=VALUE
    #[arg(required = true, value_parser = parse_entry)]
    pub entries: Vec<(String, String)>,

    /// Sliding expiration in seconds (default: [session] idle_timeout_secs)
    #[arg(long)]
    pub idle_secs: Option<u64>,

    /// Hard expiry ceiling as an RFC 3339 timestamp
    #[arg(long, value_parser = parse_timestamp)]
    pub absolute: Option<DateTime<Utc>>,

    /// Keep existing entries and only set the given keys. A stored absolute
    /// ceiling is kept; a different --absolute is rejected.
    #[arg(long)]
    pub merge: bool,
}

#[derive(Debug, Serialize)]
struct PutOutput<'a> {
    session_id: &'a str,
    entries: usize,
    merged: bool,
}

/// Run the put command.
pub async fn run(args: PutArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let mut options = ctx.config.session_section().to_session_options();
    if let Some(secs) = args.idle_secs {
        options = options.with_idle_timeout(Duration::from_secs(secs));
    }

    let written = if args.merge {
        // Read-modify-write through a session handle so the stored absolute
        // ceiling is carried forward.
        let mut session = store.create_with_options(&args.session_id, &options, || true, false)?;
        if let Some(at) = args.absolute {
            session = session.with_absolute_expiration(at);
        }
        session.try_load().await;
        if !session.is_available() {
            bail!(
                "session '{}' could not be loaded; refusing to overwrite it",
                args.session_id
            );
        }
        if let (Some(requested), Some(stored)) = (args.absolute, session.absolute_expiration())
            && requested.trunc_subsecs(3) != stored
        {
            bail!(
                "session '{}' already expires no later than {}; --absolute cannot change it when merging",
                args.session_id,
                stored.to_rfc3339()
            );
        }
        for (key, value) in args.entries {
            session.set(&key, value).await?;
        }
        session.commit().await?;
        session.keys().await.len()
    } else {
        let entries: Entries = args.entries.into_iter().collect();
        let mut policy = ExpirationPolicy::sliding(options.idle_timeout);
        if let Some(at) = args.absolute {
            policy = policy.with_absolute(at);
        }
        store.commit(&args.session_id, &entries, policy).await?;
        entries.len()
    };

    if ctx.json_output {
        let output = PutOutput {
            session_id: &args.session_id,
            entries: written,
            merged: args.merge,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let green = Style::new().green();
        println!(
            "{} Stored {} entries in session {}",
            green.apply_to("✓"),
            written,
            args.session_id
        );
    }

    Ok(())
}
