//! SQLite-backed session store.
//!
//! The store is the only component that touches the `session_entries` table.
//! Each operation runs on Tokio's blocking pool against a single connection
//! guarded by a non-poisoning mutex, so callers only ever suspend their own
//! task. Every operation carries a deadline that bounds both the wait for the
//! connection and the engine's own lock waits; a commit that overruns its
//! deadline is rolled back before `COMMIT` is issued.
//!
//! Two commits for the same session are serialized by the connection but not
//! versioned: whichever commits last replaces the other's entries wholesale.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, TransactionBehavior, params};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{SessionOptions, StoreConfig};
use crate::error::{Error, Result};
use crate::record::{
    Entries, ExpirationPolicy, SessionRecord, truncate_to_millis, validate_entry_key,
    validate_session_id,
};
use crate::schema::{self, DELETE_EXPIRED, DELETE_SESSION, INSERT_ENTRY, SELECT_LIVE};
use crate::session::Session;

/// Row counts reported by [`SessionStore::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Sessions with at least one live entry.
    pub sessions: usize,
    /// Live entries across all sessions.
    pub entries: usize,
    /// Entries past their expiry that the sweeper has not reclaimed yet.
    pub expired_entries: usize,
}

struct StoreInner {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    config: StoreConfig,
}

/// Persists session entry sets and enforces their expiration.
///
/// Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Open the store described by `config` using wall-clock time.
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Open the store described by `config`, reading time from `clock`.
    pub fn open_with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = match &config.path {
            Some(path) => schema::open_file(path, config.busy_timeout)?,
            None => schema::open_in_memory(config.busy_timeout)?,
        };

        Ok(Self {
            inner: Arc::new(StoreInner {
                conn: Mutex::new(conn),
                clock,
                config,
            }),
        })
    }

    /// Open a private in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::open(StoreConfig::default())
    }

    /// The configuration this store was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Current time according to the store's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    // ── Session handles ─────────────────────────────────────────────

    /// Create a request-scoped session handle bound to `session_key`.
    ///
    /// Storage is not touched; the handle loads lazily. `try_establish`
    /// reports whether the session identifier can still be issued to the
    /// client and is consulted before the first write to a new session.
    pub fn create<F>(
        &self,
        session_key: &str,
        idle_timeout: Duration,
        io_timeout: Duration,
        try_establish: F,
        is_new: bool,
    ) -> Result<Session>
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        let options = SessionOptions::new()
            .with_idle_timeout(idle_timeout)
            .with_io_timeout(io_timeout);
        self.create_with_options(session_key, &options, try_establish, is_new)
    }

    /// Create a session handle from a full set of [`SessionOptions`].
    pub fn create_with_options<F>(
        &self,
        session_key: &str,
        options: &SessionOptions,
        try_establish: F,
        is_new: bool,
    ) -> Result<Session>
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        validate_session_id(session_key)?;
        if options.idle_timeout.is_zero() {
            return Err(Error::InvalidArgument(
                "idle timeout must be positive".to_string(),
            ));
        }
        let absolute_expiration = options
            .absolute_lifetime
            .map(|lifetime| self.absolute_ceiling(lifetime))
            .transpose()?;

        Ok(Session::new(
            self.clone(),
            session_key.to_string(),
            options.clone(),
            Box::new(try_establish),
            is_new,
            absolute_expiration,
        ))
    }

    /// `now + lifetime` at millisecond precision.
    fn absolute_ceiling(&self, lifetime: Duration) -> Result<DateTime<Utc>> {
        if lifetime.is_zero() {
            return Err(Error::InvalidArgument(
                "absolute lifetime must be positive".to_string(),
            ));
        }
        let out_of_range =
            || Error::InvalidArgument(format!("absolute lifetime {lifetime:?} is out of range"));
        let lifetime = chrono::Duration::from_std(lifetime).map_err(|_| out_of_range())?;
        self.now()
            .checked_add_signed(lifetime)
            .map(truncate_to_millis)
            .ok_or_else(out_of_range)
    }

    // ── Store operations ────────────────────────────────────────────

    /// All live entries of `session_id`. Absent or expired sessions yield an
    /// empty mapping.
    pub async fn retrieve(&self, session_id: &str) -> Result<Entries> {
        Ok(self
            .retrieve_record(session_id)
            .await?
            .map(|record| record.entries)
            .unwrap_or_default())
    }

    /// The live record of `session_id` with its expiration metadata.
    pub async fn retrieve_record(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        self.retrieve_record_within(session_id, self.inner.config.operation_timeout)
            .await
    }

    /// Atomically replace every row of `session_id` with `entries`.
    ///
    /// All rows get the expiry `policy` yields for the current time. An empty
    /// `entries` leaves the session with no rows.
    pub async fn commit(
        &self,
        session_id: &str,
        entries: &Entries,
        policy: ExpirationPolicy,
    ) -> Result<()> {
        self.commit_within(
            session_id,
            entries,
            policy,
            self.inner.config.operation_timeout,
        )
        .await
    }

    /// Delete every row of `session_id`. Removing an absent session succeeds.
    pub async fn remove(&self, session_id: &str) -> Result<()> {
        validate_session_id(session_id)?;
        let id = session_id.to_string();

        let removed = self
            .run(
                "remove",
                Some(session_id),
                self.inner.config.operation_timeout,
                move |conn, _deadline, _now| Ok(conn.execute(DELETE_SESSION, params![id])?),
            )
            .await?;

        debug!(session_id = %session_id, rows = removed, "Session removed");
        Ok(())
    }

    /// Delete every row whose expiry has passed, across all sessions.
    ///
    /// Returns the number of rows removed.
    pub async fn cleanup_expired(&self) -> Result<usize> {
        let removed = self
            .run(
                "cleanup_expired",
                None,
                self.inner.config.operation_timeout,
                |conn, _deadline, now| {
                    Ok(conn.execute(DELETE_EXPIRED, params![schema::to_millis(now)])?)
                },
            )
            .await?;

        if removed > 0 {
            info!(count = removed, "Cleaned up expired session rows");
        } else {
            debug!("No expired session rows to clean up");
        }
        Ok(removed)
    }

    /// Count live sessions, live entries and expired entries awaiting a sweep.
    pub async fn stats(&self) -> Result<StoreStats> {
        self.run(
            "stats",
            None,
            self.inner.config.operation_timeout,
            |conn, _deadline, now| {
                let now = schema::to_millis(now);
                let (sessions, entries, expired): (i64, i64, i64) = conn.query_row(
                    "SELECT
                        COUNT(DISTINCT CASE WHEN expires_at_time > ?1 THEN session_id END),
                        COALESCE(SUM(expires_at_time > ?1), 0),
                        COALESCE(SUM(expires_at_time <= ?1), 0)
                     FROM session_entries",
                    params![now],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )?;
                Ok(StoreStats {
                    sessions: sessions as usize,
                    entries: entries as usize,
                    expired_entries: expired as usize,
                })
            },
        )
        .await
    }

    // ── Deadline-bound variants used by sessions ────────────────────

    pub(crate) async fn retrieve_record_within(
        &self,
        session_id: &str,
        timeout: Duration,
    ) -> Result<Option<SessionRecord>> {
        validate_session_id(session_id)?;
        let id = session_id.to_string();

        let record = self
            .run("retrieve", Some(session_id), timeout, move |conn, _deadline, now| {
                load_live(conn, &id, now)
            })
            .await?;

        debug!(
            session_id = %session_id,
            entries = record.as_ref().map_or(0, |r| r.entries.len()),
            "Session retrieved"
        );
        Ok(record)
    }

    pub(crate) async fn commit_within(
        &self,
        session_id: &str,
        entries: &Entries,
        policy: ExpirationPolicy,
        timeout: Duration,
    ) -> Result<()> {
        validate_session_id(session_id)?;
        for key in entries.keys() {
            validate_entry_key(key)?;
        }
        let expires_at = policy.expires_at(self.now())?;

        let id = session_id.to_string();
        let rows = entries.clone();
        let count = rows.len();

        self.run("commit", Some(session_id), timeout, move |conn, deadline, _now| {
            replace_entries(conn, &id, &rows, policy, expires_at, deadline, timeout)
        })
        .await?;

        debug!(
            session_id = %session_id,
            entries = count,
            expires_at = %expires_at.to_rfc3339(),
            "Session committed"
        );
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn inner_lock_for_test(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.inner.conn.lock()
    }

    /// Run `op` on the blocking pool with the connection held.
    ///
    /// The wait for the connection and the engine's busy wait are both
    /// bounded by `timeout`. Failures are logged with the operation name and
    /// session id, then returned unchanged.
    async fn run<T, F>(
        &self,
        operation: &'static str,
        session_id: Option<&str>,
        timeout: Duration,
        op: F,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, Instant, DateTime<Utc>) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let started = Instant::now();
        let deadline = started + timeout;

        let result = tokio::task::spawn_blocking(move || {
            let mut conn = inner
                .conn
                .try_lock_until(deadline)
                .ok_or_else(|| Error::Connection {
                    operation,
                    message: format!("no connection available within {timeout:?}"),
                })?;

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout { operation, timeout });
            }
            conn.busy_timeout(remaining.min(inner.config.busy_timeout))?;

            let now = inner.clock.now();
            op(&mut conn, deadline, now).map_err(|e| match e {
                Error::Database(err) => Error::from_engine(operation, err),
                other => other,
            })
        })
        .await
        .unwrap_or_else(|e| Err(Error::Task(e.to_string())));

        match &result {
            Ok(_) => debug!(
                operation,
                session_id = session_id.unwrap_or("-"),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Store operation complete"
            ),
            Err(e) => warn!(
                operation,
                session_id = session_id.unwrap_or("-"),
                error = %e,
                "Store operation failed"
            ),
        }
        result
    }
}

/// Read the live rows of one session into a record.
fn load_live(
    conn: &Connection,
    session_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<SessionRecord>> {
    let mut stmt = conn.prepare_cached(SELECT_LIVE)?;
    let rows = stmt.query_map(params![session_id, schema::to_millis(now)], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<String>>(1)?,
            schema::from_millis(2, row.get(2)?)?,
            row.get::<_, Option<i64>>(3)?,
            row.get::<_, Option<i64>>(4)?,
        ))
    })?;

    let mut record: Option<SessionRecord> = None;
    for row in rows {
        let (key, value, expires_at, sliding_secs, absolute) = row?;
        let absolute_expiration = absolute
            .map(|ms| schema::from_millis(4, ms))
            .transpose()?;
        let current = record.get_or_insert_with(|| SessionRecord {
            session_id: session_id.to_string(),
            entries: Entries::new(),
            expires_at,
            sliding_window: sliding_secs.map(|s| Duration::from_secs(s.max(0) as u64)),
            absolute_expiration,
        });
        current.entries.insert(key, value.unwrap_or_default());
    }

    Ok(record)
}

/// Delete-then-insert inside one immediate transaction.
///
/// Dropping the transaction on any early return rolls it back, so readers
/// see either the previous row set or the new one.
fn replace_entries(
    conn: &mut Connection,
    session_id: &str,
    entries: &Entries,
    policy: ExpirationPolicy,
    expires_at: DateTime<Utc>,
    deadline: Instant,
    timeout: Duration,
) -> Result<()> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| Error::from_engine("commit", e))?;

    let failed = |source| Error::Transaction {
        session_id: session_id.to_string(),
        source,
    };

    tx.execute(DELETE_SESSION, params![session_id])
        .map_err(failed)?;
    {
        let mut insert = tx.prepare_cached(INSERT_ENTRY).map_err(failed)?;
        let sliding = policy.sliding.map(|d| d.as_secs() as i64);
        let absolute = policy.absolute.map(schema::to_millis);
        let expires = schema::to_millis(expires_at);

        for (key, value) in entries {
            insert
                .execute(params![session_id, key, value, expires, sliding, absolute])
                .map_err(failed)?;
        }
    }

    if Instant::now() >= deadline {
        // `tx` drops here and rolls back.
        return Err(Error::Timeout {
            operation: "commit",
            timeout,
        });
    }

    tx.commit().map_err(failed)
}
