use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;

use crate::client::{ClientEvent, MessagingClient};
use crate::config::ServerConfig;
use crate::events::EventBus;
use crate::handlers;
use crate::phone::PhoneFormatter;
use crate::response::ApiError;
use crate::session::SessionStatus;
use crate::staging::AttachmentStager;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<dyn MessagingClient>,
    pub phone: PhoneFormatter,
    pub stager: AttachmentStager,
    pub events: EventBus,
    pub session: SessionStatus,
    /// Sink for bridge webhooks; `None` when the client reports events itself.
    pub client_events: Option<mpsc::UnboundedSender<ClientEvent>>,
    /// Token `/webhook/bridge` callers must present; `None` leaves it open.
    pub webhook_secret: Option<String>,
    pub keep_alive_interval_seconds: u64,
    /// Cancelled on shutdown; open push channels end when it fires.
    pub shutdown: CancellationToken,
}

pub fn build_app(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(handlers::dashboard))
        .route("/events", get(handlers::events))
        .route("/checknumber", post(handlers::check_number))
        .route("/sendmessage", post(handlers::send_message))
        .route("/sendpdf", post(handlers::send_pdf))
        .route("/webhook/bridge", post(handlers::bridge_webhook))
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz))
        .route("/status", get(handlers::status))
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_seconds),
        ))
        .layer(middleware::map_response(envelope_timeout))
}

/// The timeout layer answers with an empty body; give it the envelope.
async fn envelope_timeout(response: Response) -> Response {
    if response.status() == StatusCode::REQUEST_TIMEOUT {
        return ApiError::Timeout.into_response();
    }
    response
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    ApiError::Internal(detail.to_string()).into_response()
}
