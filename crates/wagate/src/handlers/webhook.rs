//! Inbound lifecycle webhooks from the WhatsApp bridge.

use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use super::RequestBody;
use crate::client::evolution::parse_webhook;
use crate::server::AppState;

/// Header carrying the webhook token, for bridges that can set headers.
pub const WEBHOOK_TOKEN_HEADER: &str = "x-webhook-token";

/// POST /webhook/bridge
///
/// The token is read from the `x-webhook-token` header or the `token` query
/// parameter. Authorized calls always get 200, even for events that
/// translate to nothing.
pub async fn bridge_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    RequestBody(payload): RequestBody,
) -> (StatusCode, &'static str) {
    if let Some(ref secret) = state.webhook_secret
        && !token_matches(secret, &headers, query.as_deref())
    {
        warn!("Rejected bridge webhook with a missing or wrong token");
        return (StatusCode::UNAUTHORIZED, "unauthorized");
    }

    let events = parse_webhook(&payload);
    debug!(
        event = payload["event"].as_str().unwrap_or_default(),
        translated = events.len(),
        "Bridge webhook received"
    );

    let Some(ref sink) = state.client_events else {
        return (StatusCode::OK, "ok");
    };
    for event in events {
        if sink.send(event).is_err() {
            warn!("Session supervisor is gone, dropping webhook event");
            break;
        }
    }

    (StatusCode::OK, "ok")
}

fn token_matches(secret: &str, headers: &HeaderMap, query: Option<&str>) -> bool {
    let presented = headers
        .get(WEBHOOK_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| {
            url::form_urlencoded::parse(query?.as_bytes())
                .find(|(key, _)| key == "token")
                .map(|(_, value)| value.into_owned())
        });

    presented.is_some_and(|token| token.as_bytes().ct_eq(secret.as_bytes()).into())
}
