//! CLI command handlers.

pub mod config;
pub mod get;
pub mod migrate;
pub mod new;
pub mod put;
pub mod remove;
pub mod stats;
pub mod sweep;
pub mod sweeper;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use satchel_config::{ConfigSource, SatchelConfig};
use satchel_store::{SessionStore, StoreConfig};
use tracing::warn;

/// Database filename used when neither `--db` nor `[store] path` is set.
const DEFAULT_DB_FILE: &str = "sessions.db";

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Effective configuration after layering.
    pub config: SatchelConfig,
    /// Config files that were checked, lowest precedence first.
    pub sources: Vec<ConfigSource>,
    /// Database path given on the command line.
    pub db_override: Option<PathBuf>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Resolve configuration: an explicit `--config` file, or discovered layers.
    pub fn load(
        config_file: Option<&Path>,
        db_override: Option<PathBuf>,
        json_output: bool,
        verbose: bool,
    ) -> Result<Self> {
        let (config, sources) = match config_file {
            Some(path) => {
                let config = satchel_config::load_config_file(path)?;
                config.validate()?;
                let source = ConfigSource {
                    path: path.to_path_buf(),
                    loaded: true,
                };
                (config, vec![source])
            }
            None => {
                let loaded = satchel_config::load_config(None)?;
                for warning in &loaded.warnings {
                    warn!("{}", warning);
                }
                (loaded.config, loaded.sources)
            }
        };

        Ok(Self {
            config,
            sources,
            db_override,
            json_output,
            verbose,
        })
    }

    /// Store configuration with `--db` applied on top of the config file.
    pub fn store_config(&self) -> StoreConfig {
        let config = self
            .config
            .store_section()
            .to_store_config(Some(default_db_path()));

        match &self.db_override {
            Some(path) => config.with_path(path),
            None => config,
        }
    }

    /// Open (and migrate) the session database.
    pub fn open_store(&self) -> Result<SessionStore> {
        let config = self.store_config();
        let path = config
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ":memory:".to_string());
        SessionStore::open(config).with_context(|| format!("failed to open session store at {path}"))
    }
}

/// `sessions.db` under the platform data directory.
fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("satchel").join(DEFAULT_DB_FILE))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE))
}

/// Parse a `key=value` argument. The value may be empty or contain `=`.
pub fn parse_entry(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

/// Parse an RFC 3339 timestamp into UTC.
pub fn parse_timestamp(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

/// Format a duration as whole seconds.
pub fn format_secs(duration: Duration) -> String {
    format!("{}s", duration.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entry() {
        assert_eq!(
            parse_entry("user=alice").unwrap(),
            ("user".to_string(), "alice".to_string())
        );
        assert_eq!(
            parse_entry("query=a=b").unwrap(),
            ("query".to_string(), "a=b".to_string())
        );
        assert_eq!(
            parse_entry("flag=").unwrap(),
            ("flag".to_string(), String::new())
        );
        assert!(parse_entry("novalue").is_err());
        assert!(parse_entry("=value").is_err());
    }

    #[test]
    fn test_parse_timestamp() {
        let at = parse_timestamp("2030-01-01T01:00:00+01:00").unwrap();
        assert_eq!(at, DateTime::parse_from_rfc3339("2030-01-01T00:00:00Z").unwrap());
        assert!(parse_timestamp("tomorrow").is_err());
    }

    #[test]
    fn test_db_override_wins() {
        let ctx = Context {
            config: SatchelConfig::from_toml("[store]\npath = \"from-config.db\"\n").unwrap(),
            sources: Vec::new(),
            db_override: Some(PathBuf::from("from-flag.db")),
            json_output: false,
            verbose: false,
        };
        assert_eq!(ctx.store_config().path, Some(PathBuf::from("from-flag.db")));
    }
}
