//! Process-local record store for development and tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use quietgate_application::{AttemptCollection, RecordStore};
use quietgate_core::{AppError, AppResult};
use quietgate_domain::AttemptRecord;
use tokio::sync::RwLock;

/// In-memory implementation of the record store port.
#[derive(Default)]
pub struct InMemoryRecordStore {
    collections: RwLock<HashMap<String, Arc<InMemoryAttemptCollection>>>,
    open_calls: AtomicUsize,
    failing_opens: AtomicUsize,
}

impl InMemoryRecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `open_collection` calls received so far.
    #[must_use]
    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    /// Makes the next `count` opens fail with a connection error.
    pub fn fail_next_opens(&self, count: usize) {
        self.failing_opens.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn open_collection(&self, name: &str) -> AppResult<Arc<dyn AttemptCollection>> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);

        let should_fail = self
            .failing_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();
        if should_fail {
            return Err(AppError::StoreConnection(format!(
                "in-memory store refused to open collection '{name}'"
            )));
        }

        let mut collections = self.collections.write().await;
        let collection = collections.entry(name.to_owned()).or_default().clone();

        Ok(collection)
    }
}

#[derive(Default)]
struct InMemoryAttemptCollection {
    records: RwLock<Vec<AttemptRecord>>,
}

#[async_trait]
impl AttemptCollection for InMemoryAttemptCollection {
    async fn insert(&self, record: AttemptRecord) -> AppResult<()> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn find_by_identifier(&self, identifier: &str) -> AppResult<Vec<AttemptRecord>> {
        let mut found: Vec<AttemptRecord> = self
            .records
            .read()
            .await
            .iter()
            .filter(|record| record.identifier() == identifier)
            .cloned()
            .collect();
        found.sort_by_key(|record| std::cmp::Reverse(record.timestamp()));

        Ok(found)
    }

    async fn delete(&self, identifier: Option<&str>) -> AppResult<u64> {
        let mut records = self.records.write().await;
        let before = records.len();
        match identifier {
            Some(identifier) => records.retain(|record| record.identifier() != identifier),
            None => records.clear(),
        }

        Ok(u64::try_from(before - records.len()).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use quietgate_application::{HistoryStore, RecordStore, ThrottleService};
    use quietgate_core::AppError;
    use quietgate_domain::{AttemptRecord, ThrottleConfig, ThrottleDenial};

    use super::InMemoryRecordStore;
    use crate::SystemClock;

    #[tokio::test]
    async fn collections_are_isolated_by_name() {
        let store = InMemoryRecordStore::new();
        let captcha = store.open_collection("captcha").await;
        let signup = store.open_collection("signup").await;
        assert!(captcha.is_ok() && signup.is_ok());

        if let (Ok(captcha), Ok(signup)) = (captcha, signup) {
            let record = AttemptRecord::new("192.0.2.1", Utc::now());
            assert!(record.is_ok());
            if let Ok(record) = record {
                assert!(captcha.insert(record).await.is_ok());
            }

            assert_eq!(captcha.find_by_identifier("192.0.2.1").await.map(|items| items.len()).ok(), Some(1));
            assert_eq!(signup.find_by_identifier("192.0.2.1").await.map(|items| items.len()).ok(), Some(0));
        }
    }

    #[tokio::test]
    async fn reopened_collection_keeps_records() {
        let store = InMemoryRecordStore::new();
        if let Ok(first) = store.open_collection("captcha").await {
            if let Ok(record) = AttemptRecord::new("a", Utc::now()) {
                assert!(first.insert(record).await.is_ok());
            }
        }

        let reopened = store.open_collection("captcha").await;
        assert!(reopened.is_ok());
        if let Ok(reopened) = reopened {
            assert_eq!(reopened.find_by_identifier("a").await.map(|items| items.len()).ok(), Some(1));
        }
    }

    #[tokio::test]
    async fn find_returns_newest_first() {
        let store = InMemoryRecordStore::new();
        let now = Utc::now();
        if let Ok(collection) = store.open_collection("captcha").await {
            for offset in [3, 1, 2] {
                if let Ok(record) = AttemptRecord::new("a", now - Duration::seconds(offset)) {
                    assert!(collection.insert(record).await.is_ok());
                }
            }

            let found = collection.find_by_identifier("a").await.unwrap_or_default();
            let ages: Vec<i64> = found.iter().map(|record| record.age_millis(now) / 1_000).collect();
            assert_eq!(ages, vec![1, 2, 3]);
        }
    }

    #[tokio::test]
    async fn failed_open_is_reported_as_connection_error() {
        let store = Arc::new(InMemoryRecordStore::new());
        store.fail_next_opens(1);
        let history = HistoryStore::new(store.clone(), Arc::new(SystemClock::new()), "captcha");

        assert!(matches!(
            history.get_history("a").await,
            Err(AppError::StoreConnection(_))
        ));
        assert!(history.get_history("a").await.is_ok());
        assert_eq!(store.open_calls(), 2);
    }

    #[tokio::test]
    async fn throttle_runs_end_to_end_on_the_wall_clock() {
        let store = Arc::new(InMemoryRecordStore::new());
        let config = ThrottleConfig::default().with_quiet_time_millis(Some(60_000));
        let throttle = ThrottleService::new(store.clone(), Arc::new(SystemClock::new()), config);

        assert!(throttle.record_attempt_now("198.51.100.9").await.is_ok());
        let outcome = throttle.evaluate("198.51.100.9").await;
        assert!(outcome.is_ok_and(|outcome| {
            outcome.error == Some(ThrottleDenial::SubmittedTooFrequently) && outcome.hits.count() == 1
        }));
        assert_eq!(store.open_calls(), 1);
    }
}
