use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;
use ipnet::IpNet;
use quietgate_core::AppError;
use quietgate_domain::DecisionOutcome;
use tracing::{debug, warn};

use crate::error::ApiResult;
use crate::state::AppState;

/// Outcome of the throttle check attached to every gated request.
///
/// Holds the decision, or the store failure that prevented one.
#[derive(Debug, Clone)]
pub struct ThrottleCheck(pub Result<DecisionOutcome, AppError>);

/// Evaluates the caller against the throttle and always continues.
///
/// The result is attached to the request as a [`ThrottleCheck`] extension;
/// downstream handlers decide how to respond to a denial or a store failure.
pub async fn throttle_gate(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    mut request: Request,
    next: Next,
) -> Response {
    let identifier = client_identifier(peer.ip(), request.headers(), &state.trusted_proxies);
    let check = state.throttle_service.evaluate(&identifier).await;

    match &check {
        Ok(outcome) => debug!(
            identifier = %identifier,
            allowed = outcome.is_allowed(),
            count = outcome.hits.count(),
            "throttle decision attached"
        ),
        Err(error) => warn!(
            identifier = %identifier,
            error = %error,
            "throttle decision unavailable"
        ),
    }

    request.extensions_mut().insert(ThrottleCheck(check));
    next.run(request).await
}

/// Admits the request only when it carries the configured admin bearer token.
///
/// Admin routes are closed entirely when no token is configured.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Err(AppError::Unauthorized("admin access is not configured".to_owned()).into());
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or_default();

    if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        return Err(AppError::Unauthorized("invalid admin token".to_owned()).into());
    }

    Ok(next.run(request).await)
}

/// Resolves the identifier attempts are grouped under.
///
/// `x-forwarded-for` is only honoured when the direct peer is a trusted proxy.
/// Hops are read right to left, skipping trusted proxies, so the first
/// untrusted address wins; entries further left are client-supplied and
/// ignored. An unparsable hop stops the walk at the last address reached.
pub fn client_identifier(peer: IpAddr, headers: &HeaderMap, trusted_proxies: &[IpNet]) -> String {
    let is_trusted = |address: &IpAddr| {
        trusted_proxies
            .iter()
            .any(|network| network.contains(address))
    };
    if !is_trusted(&peer) {
        return peer.to_string();
    }

    let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    else {
        return peer.to_string();
    };

    let mut client = peer;
    for hop in forwarded.rsplit(',') {
        let Ok(address) = hop.trim().parse::<IpAddr>() else {
            break;
        };
        client = address;
        if !is_trusted(&address) {
            break;
        }
    }

    client.to_string()
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }

    left.iter()
        .zip(right)
        .fold(0_u8, |difference, (a, b)| difference | (a ^ b))
        == 0
}
