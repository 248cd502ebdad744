//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_record_store;
mod postgres_record_store;
mod redis_record_store;
mod system_clock;

pub use in_memory_record_store::InMemoryRecordStore;
pub use postgres_record_store::{PostgresRecordStore, run_migrations};
pub use redis_record_store::RedisRecordStore;
pub use system_clock::SystemClock;
