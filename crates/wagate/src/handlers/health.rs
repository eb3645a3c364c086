use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::server::AppState;
use crate::session::StateSnapshot;

pub async fn livez() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Ready only once the messaging session can send.
pub async fn readyz(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if state.session.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "session not ready")
    }
}

/// GET /status
pub async fn status(State(state): State<AppState>) -> Json<StateSnapshot> {
    Json(state.session.current())
}
