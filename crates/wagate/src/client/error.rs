//! Messaging client error types.

use thiserror::Error;

/// Errors that can occur when talking to the messaging session.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request to the bridge failed
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Bridge returned an error response
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Bridge answered with a body we could not interpret
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Session is not connected
    #[error("session not connected")]
    NotConnected,

    /// Reading a media file failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Bridge base URL could not be joined with an endpoint path
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}
