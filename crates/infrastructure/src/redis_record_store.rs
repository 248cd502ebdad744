//! Redis-backed record store.
//!
//! Each identifier's attempts live in one sorted set keyed
//! `{prefix}:{collection}:{identifier}`, scored by the attempt's epoch millis.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use quietgate_application::{AttemptCollection, RecordStore};
use quietgate_core::{AppError, AppResult};
use quietgate_domain::AttemptRecord;
use redis::Script;
use redis::aio::MultiplexedConnection;
use tracing::debug;

const DELETE_SET_SCRIPT: &str = r#"
local removed = redis.call('ZCARD', KEYS[1])
redis.call('DEL', KEYS[1])
return removed
"#;

const SCAN_BATCH_SIZE: usize = 200;

/// Redis implementation of the record store port.
#[derive(Clone)]
pub struct RedisRecordStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisRecordStore {
    /// Creates a store with a configured Redis client and key prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }
}

#[async_trait]
impl RecordStore for RedisRecordStore {
    async fn open_collection(&self, name: &str) -> AppResult<Arc<dyn AttemptCollection>> {
        let connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| {
                AppError::StoreConnection(format!("failed to connect to redis: {error}"))
            })?;

        debug!(collection = name, "opened redis attempt collection");

        Ok(Arc::new(RedisAttemptCollection {
            connection,
            collection_prefix: format!("{}:{name}", self.key_prefix),
        }))
    }
}

struct RedisAttemptCollection {
    connection: MultiplexedConnection,
    collection_prefix: String,
}

impl RedisAttemptCollection {
    fn key_for(&self, identifier: &str) -> String {
        format!("{}:{identifier}", self.collection_prefix)
    }

    fn identifier_from_key<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(self.collection_prefix.as_str())
            .and_then(|rest| rest.strip_prefix(':'))
            .unwrap_or(key)
    }

    async fn delete_key(&self, key: &str) -> AppResult<u64> {
        let mut connection = self.connection.clone();
        Script::new(DELETE_SET_SCRIPT)
            .key(key)
            .invoke_async::<u64>(&mut connection)
            .await
            .map_err(|error| {
                AppError::StoreWrite(format!("failed to delete redis attempt history: {error}"))
            })
    }

    async fn scan_collection_keys(&self) -> AppResult<Vec<String>> {
        let mut connection = self.connection.clone();
        let pattern = format!("{}:*", self.collection_prefix);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH_SIZE)
                .query_async(&mut connection)
                .await
                .map_err(|error| {
                    AppError::StoreWrite(format!("failed to scan redis attempt keys: {error}"))
                })?;

            keys.extend(batch);
            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }

        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }
}

#[async_trait]
impl AttemptCollection for RedisAttemptCollection {
    async fn insert(&self, record: AttemptRecord) -> AppResult<()> {
        let millis = record.timestamp().timestamp_millis();
        let member = format!("{millis}:{}", uuid::Uuid::new_v4());
        let mut connection = self.connection.clone();

        redis::cmd("ZADD")
            .arg(self.key_for(record.identifier()))
            .arg(millis)
            .arg(member)
            .query_async::<()>(&mut connection)
            .await
            .map_err(|error| {
                AppError::StoreWrite(format!("failed to record redis attempt: {error}"))
            })
    }

    async fn find_by_identifier(&self, identifier: &str) -> AppResult<Vec<AttemptRecord>> {
        let mut connection = self.connection.clone();
        let entries: Vec<(String, f64)> = redis::cmd("ZREVRANGE")
            .arg(self.key_for(identifier))
            .arg(0)
            .arg(-1)
            .arg("WITHSCORES")
            .query_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::StoreQuery(format!("failed to read redis attempt history: {error}"))
            })?;

        entries
            .into_iter()
            .map(|(member, score)| {
                let timestamp = score_to_millis(score)
                    .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
                    .ok_or_else(|| {
                        AppError::StoreQuery(format!(
                            "invalid redis attempt score '{score}' for member '{member}'"
                        ))
                    })?;
                AttemptRecord::new(identifier, timestamp)
            })
            .collect()
    }

    async fn delete(&self, identifier: Option<&str>) -> AppResult<u64> {
        if let Some(identifier) = identifier {
            return self.delete_key(&self.key_for(identifier)).await;
        }

        let mut removed = 0;
        for key in self.scan_collection_keys().await? {
            let count = self.delete_key(&key).await?;
            debug!(
                identifier = self.identifier_from_key(&key),
                count, "removed redis attempt history"
            );
            removed += count;
        }

        Ok(removed)
    }
}

/// Converts a sorted-set score to epoch millis, rejecting values that do not
/// fit an `i64` exactly.
fn score_to_millis(score: f64) -> Option<i64> {
    const I64_UPPER_BOUND: f64 = 9_223_372_036_854_775_808.0;

    let rounded = score.round();
    if !rounded.is_finite() || rounded < -I64_UPPER_BOUND || rounded >= I64_UPPER_BOUND {
        return None;
    }

    Some(rounded as i64)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use quietgate_application::{HistoryStore, RecordStore};
    use quietgate_domain::AttemptRecord;

    use super::{RedisRecordStore, score_to_millis};
    use crate::SystemClock;

    #[test]
    fn scores_convert_to_millis_only_when_representable() {
        assert_eq!(score_to_millis(1_700_000_000_123.0), Some(1_700_000_000_123));
        assert_eq!(score_to_millis(1_700_000_000_122.6), Some(1_700_000_000_123));
        assert_eq!(score_to_millis(-5.0), Some(-5));
        assert_eq!(score_to_millis(f64::NAN), None);
        assert_eq!(score_to_millis(f64::INFINITY), None);
        assert_eq!(score_to_millis(f64::NEG_INFINITY), None);
        assert_eq!(score_to_millis(1.0e19), None);
        assert_eq!(score_to_millis(-1.0e19), None);
    }

    fn test_store() -> Option<RedisRecordStore> {
        let Ok(redis_url) = std::env::var("REDIS_URL") else {
            return None;
        };

        match redis::Client::open(redis_url.as_str()) {
            Ok(client) => Some(RedisRecordStore::new(
                client,
                format!("quietgate-test-{}", uuid::Uuid::new_v4()),
            )),
            Err(error) => panic!("invalid REDIS_URL in test: {error}"),
        }
    }

    #[tokio::test]
    async fn records_are_returned_newest_first() {
        let Some(store) = test_store() else {
            return;
        };

        let collection = match store.open_collection("captcha").await {
            Ok(collection) => collection,
            Err(error) => panic!("failed to open redis collection: {error}"),
        };

        let now = Utc::now();
        for offset in [5, 1, 3] {
            if let Ok(record) = AttemptRecord::new("203.0.113.1", now - Duration::seconds(offset)) {
                assert!(collection.insert(record).await.is_ok());
            }
        }

        let found = collection.find_by_identifier("203.0.113.1").await.unwrap_or_default();
        let ages: Vec<i64> = found
            .iter()
            .map(|record| (record.age_millis(now) + 500) / 1_000)
            .collect();
        assert_eq!(ages, vec![1, 3, 5]);

        assert_eq!(collection.delete(None).await.ok(), Some(3));
    }

    #[tokio::test]
    async fn clear_history_scopes_to_identifier_then_collection() {
        let Some(store) = test_store() else {
            return;
        };

        let history = HistoryStore::new(Arc::new(store), Arc::new(SystemClock::new()), "captcha");
        for identifier in ["a", "a", "b"] {
            assert!(history.record_attempt(identifier).await.is_ok());
        }

        assert_eq!(history.clear_history(Some("a")).await.ok(), Some(2));
        assert_eq!(history.clear_history(Some("a")).await.ok(), Some(0));
        assert_eq!(history.clear_history(None).await.ok(), Some(1));
        assert_eq!(
            history.get_history("b").await.map(|hits| hits.count()).ok(),
            Some(0)
        );
    }
}
