use std::sync::Arc;

use ipnet::IpNet;
use quietgate_application::ThrottleService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub throttle_service: ThrottleService,
    pub trusted_proxies: Arc<Vec<IpNet>>,
    pub admin_token: Option<Arc<str>>,
}
