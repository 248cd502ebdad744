use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use quietgate_core::{AppError, AppResult};
use quietgate_domain::{AttemptRecord, HistorySnapshot};

use super::ports::{AttemptCollection, Clock, RecordStore};

/// Queryable log of attempts keyed by identifier.
///
/// The collection handle is opened on first use and cached for the lifetime
/// of this instance. Concurrent first calls share a single open; a failed open
/// is not cached and the next call tries again.
pub struct HistoryStore {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    collection_name: String,
    collection: OnceCell<Arc<dyn AttemptCollection>>,
}

impl HistoryStore {
    /// Creates a history store over the named collection.
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        collection_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            clock,
            collection_name: collection_name.into(),
            collection: OnceCell::new(),
        }
    }

    /// Name of the backing collection.
    #[must_use]
    pub fn collection_name(&self) -> &str {
        self.collection_name.as_str()
    }

    /// Returns whether the collection handle has been opened.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.collection.initialized()
    }

    /// Returns the identifier's history, newest first.
    pub async fn get_history(&self, identifier: &str) -> AppResult<HistorySnapshot> {
        let items = self.find(identifier).await?;
        Ok(HistorySnapshot::from_records(items, self.clock.now()))
    }

    /// Records an attempt for the identifier stamped with the current time.
    pub async fn record_attempt(&self, identifier: &str) -> AppResult<()> {
        self.record_attempt_at(identifier, self.clock.now()).await
    }

    /// Deletes one identifier's history, or the whole collection when `None`.
    pub async fn clear_history(&self, identifier: Option<&str>) -> AppResult<u64> {
        if let Some(identifier) = identifier {
            require_identifier(identifier)?;
        }

        let removed = self.collection().await?.delete(identifier).await?;
        debug!(
            collection = %self.collection_name,
            identifier = identifier.unwrap_or("*"),
            removed,
            "cleared attempt history"
        );

        Ok(removed)
    }

    pub(super) async fn get_history_at(
        &self,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> AppResult<HistorySnapshot> {
        let items = self.find(identifier).await?;
        Ok(HistorySnapshot::from_records(items, now))
    }

    pub(super) async fn record_attempt_at(
        &self,
        identifier: &str,
        timestamp: DateTime<Utc>,
    ) -> AppResult<()> {
        let record = AttemptRecord::new(identifier, timestamp)?;
        self.collection().await?.insert(record).await
    }

    async fn find(&self, identifier: &str) -> AppResult<Vec<AttemptRecord>> {
        require_identifier(identifier)?;
        self.collection().await?.find_by_identifier(identifier).await
    }

    async fn collection(&self) -> AppResult<&Arc<dyn AttemptCollection>> {
        self.collection
            .get_or_try_init(|| async {
                debug!(collection = %self.collection_name, "opening attempt collection");
                self.store
                    .open_collection(self.collection_name.as_str())
                    .await
                    .inspect_err(|error| {
                        warn!(collection = %self.collection_name, %error, "failed to open attempt collection");
                    })
            })
            .await
    }
}

fn require_identifier(identifier: &str) -> AppResult<()> {
    if identifier.trim().is_empty() {
        return Err(AppError::Validation(
            "identifier must not be empty".to_owned(),
        ));
    }

    Ok(())
}
