use std::sync::Arc;

use quietgate_application::RecordStore;
use quietgate_core::AppError;
use quietgate_infrastructure::{InMemoryRecordStore, PostgresRecordStore, RedisRecordStore};
use tracing::warn;

use crate::api_config::{ApiConfig, StoreBackendConfig};

use super::build_redis_client;

/// Builds the configured record store without connecting to it.
///
/// Connections are opened lazily on the first throttle decision.
pub fn build_record_store(config: &ApiConfig) -> Result<Arc<dyn RecordStore>, AppError> {
    let store: Arc<dyn RecordStore> = match &config.store_backend {
        StoreBackendConfig::Memory => {
            warn!("using in-memory attempt history; records are lost on restart");
            Arc::new(InMemoryRecordStore::new())
        }
        StoreBackendConfig::Postgres { database_url } => Arc::new(PostgresRecordStore::new(
            database_url.clone(),
            config.database_max_connections,
        )),
        StoreBackendConfig::Redis {
            redis_url,
            key_prefix,
        } => Arc::new(RedisRecordStore::new(
            build_redis_client(redis_url)?,
            key_prefix.clone(),
        )),
    };

    Ok(store)
}
