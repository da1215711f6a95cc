//! Config command - configuration inspection.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::Style;

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration as TOML
    Show,

    /// Show which config files were checked and loaded
    Which,

    /// Show the user configuration file path
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
        ConfigCommand::Path => cmd_path(),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    // Fill in defaults so every effective value is visible.
    let mut effective = ctx.config.clone();
    effective.store = Some(ctx.config.store_section());
    effective.session = Some(ctx.config.session_section());
    effective.sweeper = Some(ctx.config.sweeper_section());

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&effective)?);
    } else {
        print!("{}", effective.to_toml()?);
    }
    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    let green = Style::new().green();
    let dim = Style::new().dim();

    for source in &ctx.sources {
        if source.loaded {
            println!("{} {}", green.apply_to("●"), source.path.display());
        } else {
            println!("{} {}", dim.apply_to("○"), dim.apply_to(source.path.display()));
        }
    }
    Ok(())
}

fn cmd_path() -> Result<()> {
    match satchel_config::xdg_config_path() {
        Some(path) => println!("{}", path.display()),
        None => anyhow::bail!("could not determine config directory"),
    }
    Ok(())
}
