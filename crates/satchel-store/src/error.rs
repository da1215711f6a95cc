//! Error types for session store operations.

use std::time::Duration;

/// Error type for session store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A session id, entry key or expiration policy was rejected before any I/O.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The backing store could not be reached, or no connection became
    /// available within the operation's deadline.
    #[error("Connection error during {operation}: {message}")]
    Connection {
        operation: &'static str,
        message: String,
    },

    /// A commit transaction failed and was rolled back.
    #[error("Transaction failed for session {session_id}: {source}")]
    Transaction {
        session_id: String,
        #[source]
        source: rusqlite::Error,
    },

    /// The operation ran past its deadline. Any open transaction was rolled back.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// A new session cannot be written because its identifier can no longer
    /// be handed to the client (for example the response already started).
    #[error("Session {0} cannot be established")]
    CannotEstablish(String),

    /// Any other database failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Schema migration failed.
    #[error("Migration error: {0}")]
    Migration(String),

    /// The blocking task running a store operation panicked or was cancelled.
    #[error("Store task failed: {0}")]
    Task(String),
}

impl Error {
    /// Whether a caller may reasonably retry the failed operation.
    ///
    /// The store never retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Connection { .. } | Error::Timeout { .. })
    }

    /// Classify a raw engine error raised while running `operation`.
    ///
    /// Lock contention and unreachable database files are connection-level
    /// failures; everything else stays a database error.
    pub(crate) fn from_engine(operation: &'static str, err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match err.sqlite_error_code() {
            Some(
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::NotADatabase,
            ) => Error::Connection {
                operation,
                message: err.to_string(),
            },
            _ => Error::Database(err),
        }
    }
}

/// Result type for session store operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let timeout = Error::Timeout {
            operation: "commit",
            timeout: Duration::from_secs(1),
        };
        let connection = Error::Connection {
            operation: "retrieve",
            message: "pool exhausted".to_string(),
        };

        assert!(timeout.is_retryable());
        assert!(connection.is_retryable());
        assert!(!Error::InvalidArgument("empty".to_string()).is_retryable());
        assert!(!Error::CannotEstablish("abc".to_string()).is_retryable());
    }

    #[test]
    fn test_busy_maps_to_connection() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        );
        assert!(matches!(
            Error::from_engine("cleanup_expired", busy),
            Error::Connection {
                operation: "cleanup_expired",
                ..
            }
        ));

        let constraint = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            None,
        );
        assert!(matches!(
            Error::from_engine("commit", constraint),
            Error::Database(_)
        ));
    }
}
