//! Lenient request body extractor.

use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value};
use tracing::debug;

use crate::response::ApiError;

/// Request body as a JSON value, accepting `application/json` and
/// `application/x-www-form-urlencoded`.
///
/// A body that does not parse becomes `Value::Null` so field validation
/// reports every required field instead of axum's plain-text rejection.
/// Oversized bodies are still rejected with the body-limit status, inside the
/// usual envelope.
pub struct RequestBody(pub Value);

impl<S> FromRequest<S> for RequestBody
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

        let bytes = Bytes::from_request(req, state).await.map_err(|rejection| {
            ApiError::Body {
                status: rejection.status(),
                message: rejection.body_text(),
            }
            .into_response()
        })?;

        let value = if is_form {
            let fields: Map<String, Value> = url::form_urlencoded::parse(&bytes)
                .into_owned()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();
            Value::Object(fields)
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                debug!(error = %e, "Request body is not valid JSON");
                Value::Null
            })
        };

        Ok(Self(value))
    }
}
