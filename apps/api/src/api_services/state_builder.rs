use std::sync::Arc;

use quietgate_application::ThrottleService;
use quietgate_core::AppError;
use quietgate_infrastructure::SystemClock;

use crate::api_config::ApiConfig;
use crate::state::AppState;

use super::build_record_store;

pub fn build_app_state(config: &ApiConfig) -> Result<AppState, AppError> {
    let throttle_service = ThrottleService::builder()
        .store(build_record_store(config)?)
        .clock(Arc::new(SystemClock::new()))
        .config(config.throttle.clone())
        .build()?;

    Ok(AppState {
        throttle_service,
        trusted_proxies: Arc::new(config.trusted_proxies.clone()),
        admin_token: config.admin_token.as_deref().map(Arc::from),
    })
}
