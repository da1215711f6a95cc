//! Table layout and connection setup.
//!
//! Sessions live in a single `session_entries` table, one row per key per
//! session. `(session_id, session_key)` is the primary key and doubles as the
//! point-lookup index; `expires_at_time` carries its own index for the sweep.
//! Timestamps are stored as unix epoch milliseconds so range predicates
//! compare numerically.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Error, Result};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

pub(crate) const SELECT_LIVE: &str = "SELECT session_key, session_value, expires_at_time,
        sliding_expiration_seconds, absolute_expiration
     FROM session_entries
     WHERE session_id = ?1 AND expires_at_time > ?2";

pub(crate) const DELETE_SESSION: &str = "DELETE FROM session_entries WHERE session_id = ?1";

pub(crate) const INSERT_ENTRY: &str = "INSERT INTO session_entries
        (session_id, session_key, session_value, expires_at_time,
         sliding_expiration_seconds, absolute_expiration)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

pub(crate) const DELETE_EXPIRED: &str =
    "DELETE FROM session_entries WHERE expires_at_time <= ?1";

/// Open (or create) the database at `path`, then migrate.
pub(crate) fn open_file(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| Error::Connection {
            operation: "open",
            message: format!("cannot create {}: {e}", parent.display()),
        })?;
    }

    let mut conn = Connection::open(path).map_err(|e| Error::from_engine("open", e))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.busy_timeout(busy_timeout)?;
    migrate(&mut conn)?;

    info!(path = %path.display(), "Session database opened");
    Ok(conn)
}

/// Open a private in-memory database, then migrate.
pub(crate) fn open_in_memory(busy_timeout: Duration) -> Result<Connection> {
    let mut conn = Connection::open_in_memory().map_err(|e| Error::from_engine("open", e))?;
    conn.busy_timeout(busy_timeout)?;
    migrate(&mut conn)?;

    debug!("In-memory session database opened");
    Ok(conn)
}

fn migrate(conn: &mut Connection) -> Result<()> {
    let report = embedded::migrations::runner()
        .run(conn)
        .map_err(|e| Error::Migration(e.to_string()))?;

    for migration in report.applied_migrations() {
        info!(version = migration.version(), name = %migration.name(), "Applied migration");
    }
    Ok(())
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Decode a stored millisecond timestamp from column `column`.
pub(crate) fn from_millis(column: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(column, millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_create_table_and_indexes() {
        let conn = open_in_memory(Duration::from_millis(100)).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'session_entries'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);

        let expiry_index: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type = 'index' AND name = 'idx_session_entries_expires_at'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(expiry_index, 1);
    }

    #[test]
    fn test_reopen_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sessions.db");

        drop(open_file(&path, Duration::from_millis(100)).unwrap());
        let conn = open_file(&path, Duration::from_millis(100)).unwrap();

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM session_entries", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[test]
    fn test_length_constraints_enforced_by_engine() {
        let conn = open_in_memory(Duration::from_millis(100)).unwrap();
        let result = conn.execute(
            INSERT_ENTRY,
            rusqlite::params!["", "k", "v", 0_i64, None::<i64>, None::<i64>],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_millis_round_trip() {
        let at = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        assert_eq!(from_millis(0, to_millis(at)).unwrap(), at);
    }
}
