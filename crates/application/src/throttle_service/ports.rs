use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use quietgate_core::AppResult;
use quietgate_domain::AttemptRecord;

/// Connectable record store that hands out attempt collections.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Opens (connecting if needed) the named collection.
    ///
    /// Failures are reported as `AppError::StoreConnection`.
    async fn open_collection(&self, name: &str) -> AppResult<Arc<dyn AttemptCollection>>;
}

/// An opened record set holding `{identifier, timestamp}` rows.
#[async_trait]
pub trait AttemptCollection: Send + Sync {
    /// Appends a record.
    async fn insert(&self, record: AttemptRecord) -> AppResult<()>;

    /// Returns every record for an identifier, newest first.
    async fn find_by_identifier(&self, identifier: &str) -> AppResult<Vec<AttemptRecord>>;

    /// Deletes the identifier's records, or every record when `None`.
    ///
    /// Returns the number of removed records.
    async fn delete(&self, identifier: Option<&str>) -> AppResult<u64>;
}

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// Returns the current UTC time.
    fn now(&self) -> DateTime<Utc>;
}
