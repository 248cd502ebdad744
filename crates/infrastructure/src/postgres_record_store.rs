//! PostgreSQL-backed record store using the `attempt_records` table.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quietgate_application::{AttemptCollection, RecordStore};
use quietgate_core::{AppError, AppResult};
use quietgate_domain::AttemptRecord;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::OnceCell;
use tracing::info;


static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Applies the embedded schema migrations.
pub async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|error| AppError::StoreConnection(format!("failed to run migrations: {error}")))
}

/// PostgreSQL implementation of the record store port.
///
/// When built from a URL the pool is connected and migrated on the first
/// `open_collection` call and reused afterwards.
pub struct PostgresRecordStore {
    database_url: Option<String>,
    max_connections: u32,
    pool: OnceCell<PgPool>,
}

impl PostgresRecordStore {
    /// Creates a store that connects lazily to `database_url`.
    #[must_use]
    pub fn new(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self {
            database_url: Some(database_url.into()),
            max_connections,
            pool: OnceCell::new(),
        }
    }

    /// Creates a store over an already connected and migrated pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            database_url: None,
            max_connections: 0,
            pool: OnceCell::new_with(Some(pool)),
        }
    }

    async fn pool(&self) -> AppResult<&PgPool> {
        self.pool
            .get_or_try_init(|| async {
                let database_url = self.database_url.as_deref().ok_or_else(|| {
                    AppError::StoreConnection("no database url configured".to_owned())
                })?;

                let pool = PgPoolOptions::new()
                    .max_connections(self.max_connections.max(1))
                    .connect(database_url)
                    .await
                    .map_err(|error| {
                        AppError::StoreConnection(format!("failed to connect to database: {error}"))
                    })?;
                run_migrations(&pool).await?;
                info!("attempt record store connected");

                Ok(pool)
            })
            .await
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn open_collection(&self, name: &str) -> AppResult<Arc<dyn AttemptCollection>> {
        let pool = self.pool().await?.clone();

        Ok(Arc::new(PostgresAttemptCollection {
            pool,
            collection: name.to_owned(),
        }))
    }
}

struct PostgresAttemptCollection {
    pool: PgPool,
    collection: String,
}

#[async_trait]
impl AttemptCollection for PostgresAttemptCollection {
    async fn insert(&self, record: AttemptRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO attempt_records (collection, identifier, recorded_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(self.collection.as_str())
        .bind(record.identifier())
        .bind(record.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::StoreWrite(format!("failed to record attempt: {error}")))?;

        Ok(())
    }

    async fn find_by_identifier(&self, identifier: &str) -> AppResult<Vec<AttemptRecord>> {
        let rows = sqlx::query_as::<_, AttemptRow>(
            r#"
            SELECT identifier, recorded_at
            FROM attempt_records
            WHERE collection = $1 AND identifier = $2
            ORDER BY recorded_at DESC, id DESC
            "#,
        )
        .bind(self.collection.as_str())
        .bind(identifier)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::StoreQuery(format!("failed to load attempt history: {error}")))?;

        rows.into_iter()
            .map(|row| AttemptRecord::new(row.identifier, row.recorded_at))
            .collect()
    }

    async fn delete(&self, identifier: Option<&str>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM attempt_records
            WHERE collection = $1
              AND ($2::text IS NULL OR identifier = $2)
            "#,
        )
        .bind(self.collection.as_str())
        .bind(identifier)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::StoreWrite(format!("failed to clear attempt history: {error}")))?;

        Ok(result.rows_affected())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AttemptRow {
    identifier: String,
    recorded_at: DateTime<Utc>,
}
