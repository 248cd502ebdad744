//! Attempt records persisted by the history store.

use chrono::{DateTime, Utc};
use quietgate_core::{AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

/// One recorded attempt for a client identifier.
///
/// Records are append-only: they are created, read and deleted but never
/// updated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    identifier: NonEmptyString,
    timestamp: DateTime<Utc>,
}

impl AttemptRecord {
    /// Creates a record for an identifier stamped at the given instant.
    pub fn new(identifier: impl Into<String>, timestamp: DateTime<Utc>) -> AppResult<Self> {
        Ok(Self {
            identifier: NonEmptyString::new(identifier)?,
            timestamp,
        })
    }

    /// Returns the client identifier the attempt belongs to.
    #[must_use]
    pub fn identifier(&self) -> &str {
        self.identifier.as_str()
    }

    /// Returns when the attempt was recorded.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Milliseconds elapsed between this record and `now`.
    #[must_use]
    pub fn age_millis(&self, now: DateTime<Utc>) -> i64 {
        (now - self.timestamp).num_milliseconds()
    }
}
