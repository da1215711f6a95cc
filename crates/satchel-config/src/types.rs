//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [store]                  # database location and timeouts
//! [session]                # per-request session defaults
//! [sweeper]                # background expiration sweep
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use satchel_store::{SessionOptions, StoreConfig};

/// Upper bound for `[session] absolute_lifetime_secs`.
pub const MAX_ABSOLUTE_LIFETIME_SECS: u64 = 100 * 365 * 24 * 60 * 60;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g. a project-local
/// override) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SatchelConfig {
    /// Database configuration.
    pub store: Option<StoreSection>,

    /// Session defaults.
    pub session: Option<SessionSection>,

    /// Expiration sweeper configuration.
    pub sweeper: Option<SweeperSection>,
}

impl SatchelConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: SatchelConfig) {
        if other.store.is_some() {
            self.store = other.store;
        }

        if other.session.is_some() {
            self.session = other.session;
        }

        if other.sweeper.is_some() {
            self.sweeper = other.sweeper;
        }
    }

    /// Check that every configured value is usable.
    ///
    /// Zero durations are rejected: a zero idle timeout would expire every
    /// session on commit and a zero sweep interval would spin.
    pub fn validate(&self) -> crate::Result<()> {
        let store = self.store_section();
        if store.operation_timeout_secs == 0 {
            return Err(invalid("store.operation_timeout_secs", "must be positive"));
        }

        let session = self.session_section();
        if session.idle_timeout_secs == 0 {
            return Err(invalid("session.idle_timeout_secs", "must be positive"));
        }
        if session.io_timeout_secs == 0 {
            return Err(invalid("session.io_timeout_secs", "must be positive"));
        }
        match session.absolute_lifetime_secs {
            Some(0) => {
                return Err(invalid("session.absolute_lifetime_secs", "must be positive"));
            }
            Some(secs) if secs > MAX_ABSOLUTE_LIFETIME_SECS => {
                return Err(invalid(
                    "session.absolute_lifetime_secs",
                    &format!("must be at most {MAX_ABSOLUTE_LIFETIME_SECS} (100 years)"),
                ));
            }
            _ => {}
        }

        if self.sweeper_section().interval_secs == 0 {
            return Err(invalid("sweeper.interval_secs", "must be positive"));
        }
        Ok(())
    }

    /// Effective store section (defaults if absent).
    pub fn store_section(&self) -> StoreSection {
        self.store.clone().unwrap_or_default()
    }

    /// Effective session section (defaults if absent).
    pub fn session_section(&self) -> SessionSection {
        self.session.clone().unwrap_or_default()
    }

    /// Effective sweeper section (defaults if absent).
    pub fn sweeper_section(&self) -> SweeperSection {
        self.sweeper.clone().unwrap_or_default()
    }
}

fn invalid(field: &'static str, reason: &str) -> crate::ConfigError {
    crate::ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Database configuration.
///
/// ```toml
/// [store]
/// path = "/var/lib/satchel/sessions.db"
/// operation_timeout_secs = 5
/// busy_timeout_ms = 2000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Database file. Relative paths resolve against the working directory.
    /// When unset, the CLI falls back to `sessions.db` in the data directory.
    pub path: Option<PathBuf>,
    /// Deadline for a single store operation, in seconds.
    pub operation_timeout_secs: u64,
    /// How long SQLite waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: None,
            operation_timeout_secs: satchel_store::DEFAULT_OPERATION_TIMEOUT.as_secs(),
            busy_timeout_ms: satchel_store::DEFAULT_BUSY_TIMEOUT.as_millis() as u64,
        }
    }
}

impl StoreSection {
    /// Build the store configuration, using `fallback_path` when no path is set.
    pub fn to_store_config(&self, fallback_path: Option<PathBuf>) -> StoreConfig {
        let config = StoreConfig::new()
            .with_operation_timeout(Duration::from_secs(self.operation_timeout_secs))
            .with_busy_timeout(Duration::from_millis(self.busy_timeout_ms));

        match self.path.clone().or(fallback_path) {
            Some(path) => config.with_path(path),
            None => config,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Per-request session defaults.
///
/// ```toml
/// [session]
/// idle_timeout_secs = 1200
/// io_timeout_secs = 5
/// absolute_lifetime_secs = 86400
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Sliding expiration window in seconds.
    pub idle_timeout_secs: u64,
    /// Deadline for each session load or commit, in seconds.
    pub io_timeout_secs: u64,
    /// Optional hard lifetime in seconds.
    pub absolute_lifetime_secs: Option<u64>,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            idle_timeout_secs: satchel_store::DEFAULT_IDLE_TIMEOUT.as_secs(),
            io_timeout_secs: satchel_store::DEFAULT_OPERATION_TIMEOUT.as_secs(),
            absolute_lifetime_secs: None,
        }
    }
}

impl SessionSection {
    /// Convert into session options for [`satchel_store::SessionStore::create_with_options`].
    pub fn to_session_options(&self) -> SessionOptions {
        let options = SessionOptions::new()
            .with_idle_timeout(Duration::from_secs(self.idle_timeout_secs))
            .with_io_timeout(Duration::from_secs(self.io_timeout_secs));

        match self.absolute_lifetime_secs {
            Some(secs) => options.with_absolute_lifetime(Duration::from_secs(secs)),
            None => options,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sweeper Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Expiration sweeper configuration.
///
/// ```toml
/// [sweeper]
/// enabled = true
/// interval_secs = 1800
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperSection {
    /// Whether the background sweeper runs.
    pub enabled: bool,
    /// Seconds between sweeps.
    pub interval_secs: u64,
}

impl Default for SweeperSection {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: satchel_store::DEFAULT_SWEEP_INTERVAL.as_secs(),
        }
    }
}

impl SweeperSection {
    /// Interval between sweeps.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}
