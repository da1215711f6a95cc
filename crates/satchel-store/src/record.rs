//! Session records, expiration policy and argument validation.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;

use crate::error::{Error, Result};

/// Drop sub-millisecond precision, matching how timestamps are persisted.
pub(crate) fn truncate_to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(3)
}

/// Longest accepted session identifier, in characters.
pub const MAX_SESSION_ID_LEN: usize = 449;

/// Longest accepted entry key, in characters.
pub const MAX_ENTRY_KEY_LEN: usize = 200;

/// Entry set of one session, ordered by key.
pub type Entries = BTreeMap<String, String>;

/// One session's persisted key/value bag and its expiration metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    /// Opaque identifier supplied by the surrounding framework.
    pub session_id: String,

    /// Key/value entries. Values read back as empty strings when stored empty or NULL.
    pub entries: Entries,

    /// Instant after which every entry of this session is expired.
    pub expires_at: DateTime<Utc>,

    /// Sliding window the last commit used, if any.
    pub sliding_window: Option<Duration>,

    /// Hard ceiling that sliding renewal never passes, if any.
    pub absolute_expiration: Option<DateTime<Utc>>,
}

impl SessionRecord {
    /// Whether the record holds no entries (equivalent to an absent session).
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the record has expired as of `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// How a commit computes the new expiry of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExpirationPolicy {
    /// Expire `sliding` after the commit.
    pub sliding: Option<Duration>,

    /// Never expire later than this instant.
    pub absolute: Option<DateTime<Utc>>,
}

impl ExpirationPolicy {
    /// Sliding expiration only.
    pub fn sliding(window: Duration) -> Self {
        Self {
            sliding: Some(window),
            absolute: None,
        }
    }

    /// Absolute expiration only.
    pub fn absolute(at: DateTime<Utc>) -> Self {
        Self {
            sliding: None,
            absolute: Some(at),
        }
    }

    /// Add (or replace) an absolute ceiling.
    pub fn with_absolute(mut self, at: DateTime<Utc>) -> Self {
        self.absolute = Some(at);
        self
    }

    /// Compute the expiry of a commit made at `now`.
    ///
    /// `now + sliding`, capped at `absolute` when one is set. The ceiling is
    /// stored with millisecond precision, so it is truncated to whole
    /// milliseconds before use. A policy with neither part, a zero window, or
    /// a ceiling that already passed is rejected.
    pub fn expires_at(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let absolute = self.absolute.map(truncate_to_millis);
        if let Some(absolute) = absolute
            && absolute <= now
        {
            return Err(Error::InvalidArgument(format!(
                "absolute expiration {} is not in the future",
                absolute.to_rfc3339()
            )));
        }

        let sliding_deadline = match self.sliding {
            Some(window) if window.is_zero() => {
                return Err(Error::InvalidArgument(
                    "sliding expiration must be positive".to_string(),
                ));
            }
            Some(window) => {
                let window = chrono::Duration::from_std(window).map_err(|_| {
                    Error::InvalidArgument(format!("sliding expiration {window:?} is out of range"))
                })?;
                Some(now.checked_add_signed(window).ok_or_else(|| {
                    Error::InvalidArgument("sliding expiration overflows".to_string())
                })?)
            }
            None => None,
        };

        match (sliding_deadline, absolute) {
            (Some(sliding), Some(absolute)) => Ok(sliding.min(absolute)),
            (Some(sliding), None) => Ok(sliding),
            (None, Some(absolute)) => Ok(absolute),
            (None, None) => Err(Error::InvalidArgument(
                "either a sliding or an absolute expiration is required".to_string(),
            )),
        }
    }
}

/// Reject empty or oversized session identifiers.
pub fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.is_empty() {
        return Err(Error::InvalidArgument(
            "session id must not be empty".to_string(),
        ));
    }
    let len = session_id.chars().count();
    if len > MAX_SESSION_ID_LEN {
        return Err(Error::InvalidArgument(format!(
            "session id is {len} characters, limit is {MAX_SESSION_ID_LEN}"
        )));
    }
    Ok(())
}

/// Reject empty or oversized entry keys.
pub fn validate_entry_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidArgument("entry key must not be empty".to_string()));
    }
    let len = key.chars().count();
    if len > MAX_ENTRY_KEY_LEN {
        return Err(Error::InvalidArgument(format!(
            "entry key is {len} characters, limit is {MAX_ENTRY_KEY_LEN}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_sliding_only() {
        let policy = ExpirationPolicy::sliding(Duration::from_secs(30));
        assert_eq!(
            policy.expires_at(t0()).unwrap(),
            t0() + chrono::Duration::seconds(30)
        );
    }

    #[test]
    fn test_absolute_caps_sliding() {
        let ceiling = t0() + chrono::Duration::seconds(10);
        let policy = ExpirationPolicy::sliding(Duration::from_secs(30)).with_absolute(ceiling);
        assert_eq!(policy.expires_at(t0()).unwrap(), ceiling);

        // Ceiling further out than the window: sliding wins.
        let far = t0() + chrono::Duration::hours(1);
        let policy = ExpirationPolicy::sliding(Duration::from_secs(30)).with_absolute(far);
        assert_eq!(
            policy.expires_at(t0()).unwrap(),
            t0() + chrono::Duration::seconds(30)
        );
    }

    #[test]
    fn test_absolute_only() {
        let at = t0() + chrono::Duration::minutes(5);
        assert_eq!(ExpirationPolicy::absolute(at).expires_at(t0()).unwrap(), at);
    }

    #[test]
    fn test_absolute_truncated_to_millis() {
        let ceiling = t0() + chrono::Duration::seconds(10);
        let policy = ExpirationPolicy::absolute(ceiling + chrono::Duration::microseconds(500));
        assert_eq!(policy.expires_at(t0()).unwrap(), ceiling);

        // Inside the sub-millisecond gap the persisted ceiling has already passed.
        let inside_gap = ceiling + chrono::Duration::microseconds(200);
        assert!(matches!(
            policy.expires_at(inside_gap),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_rejected_policies() {
        assert!(matches!(
            ExpirationPolicy::default().expires_at(t0()),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            ExpirationPolicy::sliding(Duration::ZERO).expires_at(t0()),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            ExpirationPolicy::absolute(t0()).expires_at(t0()),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_validation_bounds() {
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id(&"x".repeat(MAX_SESSION_ID_LEN)).is_ok());
        assert!(validate_session_id(&"x".repeat(MAX_SESSION_ID_LEN + 1)).is_err());

        assert!(validate_entry_key("").is_err());
        assert!(validate_entry_key(&"k".repeat(MAX_ENTRY_KEY_LEN)).is_ok());
        assert!(validate_entry_key(&"k".repeat(MAX_ENTRY_KEY_LEN + 1)).is_err());
    }

    #[test]
    fn test_record_expiry() {
        let record = SessionRecord {
            session_id: "abc".to_string(),
            entries: Entries::new(),
            expires_at: t0(),
            sliding_window: None,
            absolute_expiration: None,
        };
        assert!(record.is_empty());
        assert!(record.is_expired_at(t0()));
        assert!(!record.is_expired_at(t0() - chrono::Duration::seconds(1)));
    }
}
