//! Push channel for session lifecycle events.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::{self, StreamExt};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, warn};

use crate::events::{GREETING, PushFrame};
use crate::server::AppState;

/// GET /events
///
/// SSE endpoint streaming session events to one dashboard viewer.
///
/// Events emitted:
/// - `message`: human-readable status text (first frame is always the greeting)
/// - `qr`: `data:` URL of the pairing QR image
/// - `authenticated`: session authenticated
/// - `ready`: session ready to send
pub async fn events(State(state): State<AppState>) -> Response {
    // Subscribe before returning so nothing published after connect is missed
    let rx = state.events.subscribe();
    debug!(viewers = state.events.subscriber_count(), "Dashboard viewer connected");

    let greeting =
        stream::once(async { Ok::<_, Infallible>(to_event(&PushFrame::message(GREETING))) });

    let updates = BroadcastStream::new(rx).flat_map(|result| {
        let frames = match result {
            Ok(event) => event.frames(),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, "Dashboard viewer lagged, events dropped");
                Vec::new()
            }
        };
        stream::iter(frames.into_iter().map(|f| Ok::<_, Infallible>(to_event(&f))))
    });

    let keep_alive = KeepAlive::new()
        .interval(Duration::from_secs(state.keep_alive_interval_seconds))
        .text("keep-alive");

    let shutdown = state.shutdown.clone();
    let stream = greeting
        .chain(updates)
        .take_until(async move { shutdown.cancelled().await });

    Sse::new(stream).keep_alive(keep_alive).into_response()
}

fn to_event(frame: &PushFrame) -> Event {
    Event::default().event(frame.event).data(&frame.data)
}
