mod cors;

#[cfg(test)]
mod tests;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post};
use quietgate_core::AppError;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{handlers, middleware};

pub fn build_router(app_state: AppState, allowed_origin: Option<&str>) -> Result<Router, AppError> {
    let throttled_routes = Router::new()
        .route("/captcha/submit", post(handlers::captcha::submit_handler))
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::throttle_gate,
        ));

    let admin_routes = Router::new()
        .route(
            "/admin/history",
            delete(handlers::history::clear_all_history_handler),
        )
        .route(
            "/admin/history/{identifier}",
            get(handlers::history::get_history_handler)
                .delete(handlers::history::clear_identifier_history_handler),
        )
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::require_admin,
        ));

    let mut app = Router::new()
        .route("/health", get(handlers::health::health_handler))
        .merge(throttled_routes)
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http());

    if let Some(allowed_origin) = allowed_origin {
        app = app.layer(cors::build_cors_layer(allowed_origin)?);
    }

    Ok(app.with_state(app_state))
}
