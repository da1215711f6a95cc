//! Configuration for the session store and per-request sessions.

use std::path::PathBuf;
use std::time::Duration;

/// Default deadline for a single store operation.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time SQLite waits on a locked database before reporting busy.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(2);

/// Default idle (sliding) timeout for sessions: 20 minutes.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Default interval between expiration sweeps: 30 minutes.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Configuration for the session store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database file. `None` keeps the table in memory for the lifetime of the store.
    pub path: Option<PathBuf>,

    /// Deadline applied to store operations that are not bound to a session's
    /// own I/O timeout.
    pub operation_timeout: Duration,

    /// How long the engine waits on a locked database before giving up.
    pub busy_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with default values (in-memory database).
    pub fn new() -> Self {
        Self::default()
    }

    /// Store sessions in the database file at `path`.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the default per-operation deadline.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Set the engine busy timeout.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }
}

/// Settings a request-scoped [`Session`](crate::Session) is created with.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Sliding window: every commit pushes expiry to `now + idle_timeout`.
    pub idle_timeout: Duration,

    /// Deadline for each load or commit the session performs.
    pub io_timeout: Duration,

    /// Optional hard lifetime, measured from session creation, that sliding
    /// renewal never extends past.
    pub absolute_lifetime: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            io_timeout: DEFAULT_OPERATION_TIMEOUT,
            absolute_lifetime: None,
        }
    }
}

impl SessionOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the I/O timeout.
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Cap session lifetime regardless of activity.
    pub fn with_absolute_lifetime(mut self, lifetime: Duration) -> Self {
        self.absolute_lifetime = Some(lifetime);
        self
    }
}
