//! quietgate API composition root.

#![forbid(unsafe_code)]

mod api_config;
mod api_router;
mod api_services;
mod dto;
mod error;
mod handlers;
mod middleware;
mod state;

use std::net::SocketAddr;

use quietgate_core::AppError;
use tracing::info;

use crate::api_config::{ApiConfig, StoreBackendConfig, init_tracing};
use crate::api_router::build_router;
use crate::api_services::{build_app_state, connect_and_migrate};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ApiConfig::load()?;

    if config.migrate_only {
        let StoreBackendConfig::Postgres { database_url } = &config.store_backend else {
            return Err(AppError::Configuration(
                "the migrate command requires STORE_BACKEND=postgres".to_owned(),
            ));
        };
        connect_and_migrate(database_url).await?;
        info!("database migrations applied successfully");
        return Ok(());
    }

    let app_state = build_app_state(&config)?;
    let app = build_router(app_state, config.allowed_origin.as_deref())?;

    let address = config.socket_address()?;
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(
        %address,
        backend = config.store_backend.name(),
        collection = config.throttle.collection(),
        max_per_day = ?config.throttle.max_per_day(),
        quiet_time_millis = ?config.throttle.quiet_time_millis(),
        "quietgate-api listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|error| AppError::Internal(format!("api server error: {error}")))
}
