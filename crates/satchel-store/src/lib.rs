//! Server-side session store with sliding and absolute expiration.
//!
//! This crate persists per-session key/value state in SQLite and provides:
//! - [`SessionStore`]: atomic replace-on-commit, retrieval of live entries,
//!   idempotent removal and bulk cleanup of expired rows
//! - [`Session`]: a request-scoped handle with lazy loading and dirty tracking
//! - [`ExpirationSweeper`]: a background task that reclaims expired rows on a
//!   fixed interval
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use satchel_store::{ExpirationSweeper, SessionStore, StoreConfig};
//!
//! let store = SessionStore::open(StoreConfig::new().with_path("sessions.db"))?;
//! let sweeper = ExpirationSweeper::new(store.clone(), Duration::from_secs(1800))?.spawn();
//!
//! let mut session = store.create(
//!     "abc",
//!     Duration::from_secs(1200),
//!     Duration::from_secs(5),
//!     || true,
//!     true,
//! )?;
//! session.set("user", "alice").await?;
//! session.commit().await?;
//!
//! sweeper.shutdown().await;
//! ```

mod clock;
mod config;
mod error;
mod record;
mod schema;
mod session;
mod store;
mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    DEFAULT_BUSY_TIMEOUT, DEFAULT_IDLE_TIMEOUT, DEFAULT_OPERATION_TIMEOUT, DEFAULT_SWEEP_INTERVAL,
    SessionOptions, StoreConfig,
};
pub use error::{Error, Result};
pub use record::{
    Entries, ExpirationPolicy, MAX_ENTRY_KEY_LEN, MAX_SESSION_ID_LEN, SessionRecord,
    validate_entry_key, validate_session_id,
};
pub use session::{Session, SessionState};
pub use store::{SessionStore, StoreStats};
pub use sweeper::{ExpirationSweeper, SweepStats, SweeperHandle};
