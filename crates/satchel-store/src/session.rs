//! Request-scoped session handle.
//!
//! A [`Session`] defers its read until an entry is first touched, keeps all
//! mutations in memory, and writes the full entry set back on
//! [`Session::commit`] only when something changed:
//!
//! ```text
//! Unloaded ──first access──▶ Clean ──mutation──▶ Dirty
//!                              ▲                   │
//!                              └──────commit───────┘
//! ```
//!
//! Read failures are not fatal: the handle logs them and behaves as a fresh,
//! empty session. Commit failures are returned to the caller.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::SessionOptions;
use crate::error::{Error, Result};
use crate::record::{Entries, ExpirationPolicy, truncate_to_millis, validate_entry_key};
use crate::store::SessionStore;

pub(crate) type EstablishFn = Box<dyn Fn() -> bool + Send + Sync>;

/// Load/dirty state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing has been read from the store yet.
    Unloaded,
    /// Loaded, and the in-memory entries match what was loaded or last committed.
    Clean,
    /// Loaded and modified since the last load or commit.
    Dirty,
}

/// Per-request view of one session's entries.
pub struct Session {
    store: SessionStore,
    id: String,
    options: SessionOptions,
    try_establish: EstablishFn,
    is_new: bool,
    state: SessionState,
    entries: Entries,
    absolute_expiration: Option<DateTime<Utc>>,
    available: bool,
    found: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("is_new", &self.is_new)
            .field("state", &self.state)
            .field("entries", &self.entries.len())
            .field("available", &self.available)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub(crate) fn new(
        store: SessionStore,
        id: String,
        options: SessionOptions,
        try_establish: EstablishFn,
        is_new: bool,
        absolute_expiration: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            store,
            id,
            options,
            try_establish,
            is_new,
            state: SessionState::Unloaded,
            entries: Entries::new(),
            absolute_expiration,
            available: true,
            found: false,
        }
    }

    /// Pin a hard expiry ceiling on this session.
    ///
    /// A ceiling already persisted with the session takes precedence once loaded.
    pub fn with_absolute_expiration(mut self, at: DateTime<Utc>) -> Self {
        self.absolute_expiration = Some(truncate_to_millis(at));
        self
    }

    /// The session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the identifier was minted for this request.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Current load/dirty state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// False once a load failed and the handle fell back to an empty session.
    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Sliding window applied on commit.
    pub fn idle_timeout(&self) -> Duration {
        self.options.idle_timeout
    }

    /// Hard ceiling applied on commit, if any.
    pub fn absolute_expiration(&self) -> Option<DateTime<Utc>> {
        self.absolute_expiration
    }

    /// Load now if not loaded yet. Returns whether persisted entries were found.
    pub async fn try_load(&mut self) -> bool {
        self.load().await;
        self.found
    }

    /// All entry keys.
    pub async fn keys(&mut self) -> Vec<String> {
        self.load().await;
        self.entries.keys().cloned().collect()
    }

    /// Value stored under `key`.
    pub async fn get(&mut self, key: &str) -> Option<&str> {
        self.load().await;
        self.entries.get(key).map(String::as_str)
    }

    /// Store `value` under `key`.
    ///
    /// Fails with [`Error::CannotEstablish`] when this is a new session whose
    /// identifier can no longer be issued to the client.
    pub async fn set(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        validate_entry_key(key)?;
        if self.is_new && !(self.try_establish)() {
            return Err(Error::CannotEstablish(self.id.clone()));
        }

        self.load().await;
        self.entries.insert(key.to_string(), value.into());
        self.state = SessionState::Dirty;
        Ok(())
    }

    /// Remove `key`, returning its previous value.
    pub async fn remove(&mut self, key: &str) -> Option<String> {
        self.load().await;
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.state = SessionState::Dirty;
        }
        removed
    }

    /// Remove every entry.
    pub async fn clear(&mut self) {
        self.load().await;
        if !self.entries.is_empty() {
            self.entries.clear();
            self.state = SessionState::Dirty;
        }
    }

    /// Persist the entry set if it changed since load or the last commit.
    ///
    /// The store replaces every persisted row of this session and pushes the
    /// expiry to `now + idle_timeout`, capped by the absolute ceiling.
    pub async fn commit(&mut self) -> Result<()> {
        if self.state != SessionState::Dirty {
            debug!(session_id = %self.id, state = ?self.state, "Nothing to commit");
            return Ok(());
        }

        let mut policy = ExpirationPolicy::sliding(self.options.idle_timeout);
        if let Some(at) = self.absolute_expiration {
            policy = policy.with_absolute(at);
        }

        self.store
            .commit_within(&self.id, &self.entries, policy, self.options.io_timeout)
            .await?;

        self.state = SessionState::Clean;
        self.found = !self.entries.is_empty();
        Ok(())
    }

    async fn load(&mut self) {
        if self.state != SessionState::Unloaded {
            return;
        }

        match self
            .store
            .retrieve_record_within(&self.id, self.options.io_timeout)
            .await
        {
            Ok(Some(record)) => {
                self.entries = record.entries;
                if record.absolute_expiration.is_some() {
                    self.absolute_expiration = record.absolute_expiration;
                }
                self.found = true;
            }
            Ok(None) => {
                if !self.is_new {
                    debug!(session_id = %self.id, "Session absent or expired in store");
                }
            }
            Err(e) => {
                warn!(
                    session_id = %self.id,
                    error = %e,
                    "Session load failed, continuing with an empty session"
                );
                self.available = false;
            }
        }

        self.state = SessionState::Clean;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::StoreConfig;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn test_store() -> (SessionStore, ManualClock) {
        let clock = ManualClock::new(t0());
        let store =
            SessionStore::open_with_clock(StoreConfig::default(), Arc::new(clock.clone())).unwrap();
        (store, clock)
    }

    fn open(store: &SessionStore, id: &str, is_new: bool) -> Session {
        store
            .create(id, Duration::from_secs(30), Duration::from_secs(1), || true, is_new)
            .unwrap()
    }

    #[tokio::test]
    async fn test_lazy_load_state_machine() {
        let (store, _clock) = test_store();
        let mut session = open(&store, "abc", true);
        assert_eq!(session.state(), SessionState::Unloaded);

        // Committing an untouched handle is a no-op.
        session.commit().await.unwrap();
        assert_eq!(session.state(), SessionState::Unloaded);

        assert_eq!(session.get("user").await, None);
        assert_eq!(session.state(), SessionState::Clean);

        session.set("user", "alice").await.unwrap();
        assert_eq!(session.state(), SessionState::Dirty);

        session.commit().await.unwrap();
        assert_eq!(session.state(), SessionState::Clean);
        assert_eq!(store.retrieve("abc").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clean_commit_does_not_renew() {
        let (store, clock) = test_store();
        let mut first = open(&store, "abc", true);
        first.set("user", "alice").await.unwrap();
        first.commit().await.unwrap();

        clock.advance(chrono::Duration::seconds(20));
        let mut second = open(&store, "abc", false);
        assert!(second.try_load().await);
        second.commit().await.unwrap();

        let record = store.retrieve_record("abc").await.unwrap().unwrap();
        assert_eq!(record.expires_at, t0() + chrono::Duration::seconds(30));
    }

    #[tokio::test]
    async fn test_mutations_invisible_until_commit() {
        let (store, _clock) = test_store();
        let mut writer = open(&store, "abc", true);
        writer.set("user", "alice").await.unwrap();

        let mut reader = open(&store, "abc", false);
        assert!(!reader.try_load().await);
        assert_eq!(reader.get("user").await, None);
    }

    #[tokio::test]
    async fn test_set_preserves_untouched_keys() {
        let (store, _clock) = test_store();
        let mut first = open(&store, "abc", true);
        first.set("user", "alice").await.unwrap();
        first.set("theme", "dark").await.unwrap();
        first.commit().await.unwrap();

        let mut second = open(&store, "abc", false);
        second.set("theme", "light").await.unwrap();
        second.commit().await.unwrap();

        let stored = store.retrieve("abc").await.unwrap();
        assert_eq!(stored.get("user").map(String::as_str), Some("alice"));
        assert_eq!(stored.get("theme").map(String::as_str), Some("light"));
    }

    #[tokio::test]
    async fn test_remove_and_clear_track_dirtiness() {
        let (store, _clock) = test_store();
        let mut session = open(&store, "abc", true);

        assert_eq!(session.remove("missing").await, None);
        assert_eq!(session.state(), SessionState::Clean);
        session.clear().await;
        assert_eq!(session.state(), SessionState::Clean);

        session.set("a", "1").await.unwrap();
        session.set("b", "2").await.unwrap();
        session.commit().await.unwrap();

        assert_eq!(session.remove("a").await, Some("1".to_string()));
        assert_eq!(session.state(), SessionState::Dirty);
        session.commit().await.unwrap();
        assert_eq!(session.keys().await, vec!["b".to_string()]);

        session.clear().await;
        session.commit().await.unwrap();
        assert!(store.retrieve("abc").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cannot_establish_new_session() {
        let (store, _clock) = test_store();
        let established = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&established);
        let mut session = store
            .create(
                "abc",
                Duration::from_secs(30),
                Duration::from_secs(1),
                move || flag.load(Ordering::SeqCst),
                true,
            )
            .unwrap();

        assert!(matches!(
            session.set("user", "alice").await,
            Err(Error::CannotEstablish(_))
        ));
        assert_eq!(session.state(), SessionState::Unloaded);

        established.store(true, Ordering::SeqCst);
        session.set("user", "alice").await.unwrap();
    }

    #[tokio::test]
    async fn test_existing_session_skips_establish_check() {
        let (store, _clock) = test_store();
        let mut session = store
            .create("abc", Duration::from_secs(30), Duration::from_secs(1), || false, false)
            .unwrap();
        session.set("user", "alice").await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_key_rejected() {
        let (store, _clock) = test_store();
        let mut session = open(&store, "abc", true);
        assert!(matches!(
            session.set("", "v").await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_absolute_lifetime_persists_across_requests() {
        let (store, clock) = test_store();
        let options = SessionOptions::new()
            .with_idle_timeout(Duration::from_secs(30))
            .with_absolute_lifetime(Duration::from_secs(45));

        let mut first = store.create_with_options("abc", &options, || true, true).unwrap();
        first.set("n", "1").await.unwrap();
        first.commit().await.unwrap();

        clock.advance(chrono::Duration::seconds(25));
        let mut second = store.create_with_options("abc", &options, || true, false).unwrap();
        second.set("n", "2").await.unwrap();
        second.commit().await.unwrap();

        let ceiling = t0() + chrono::Duration::seconds(45);
        assert_eq!(second.absolute_expiration(), Some(ceiling));
        let record = store.retrieve_record("abc").await.unwrap().unwrap();
        assert_eq!(record.expires_at, ceiling);
    }

    #[tokio::test]
    async fn test_load_failure_degrades_to_empty() {
        let clock = ManualClock::new(t0());
        let store = SessionStore::open_with_clock(
            StoreConfig::default().with_operation_timeout(Duration::from_millis(20)),
            Arc::new(clock),
        )
        .unwrap();
        store
            .commit(
                "abc",
                &[("user".to_string(), "alice".to_string())].into_iter().collect(),
                ExpirationPolicy::sliding(Duration::from_secs(30)),
            )
            .await
            .unwrap();

        // A zero I/O budget makes the load fail without touching the rows.
        let mut session = store
            .create("abc", Duration::from_secs(30), Duration::ZERO, || true, false)
            .unwrap();
        assert!(!session.try_load().await);
        assert!(!session.is_available());
        assert_eq!(session.get("user").await, None);

        assert_eq!(store.retrieve("abc").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_commit_failure_propagates_and_stays_dirty() {
        let (store, clock) = test_store();
        let mut session = open(&store, "abc", true)
            .with_absolute_expiration(t0() + chrono::Duration::seconds(5));
        session.set("user", "alice").await.unwrap();

        clock.advance(chrono::Duration::seconds(10));
        assert!(matches!(
            session.commit().await,
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(session.state(), SessionState::Dirty);
    }
}
