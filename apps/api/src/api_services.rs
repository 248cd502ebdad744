mod database;
mod record_store;
mod redis;
mod state_builder;

pub use database::connect_and_migrate;
pub use record_store::build_record_store;
pub use redis::build_redis_client;
pub use state_builder::build_app_state;
