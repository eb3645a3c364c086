//! Messaging collaborator seam.
//!
//! The gateway never speaks the messaging protocol itself. Everything it needs
//! from a WhatsApp session goes through [`MessagingClient`]; lifecycle
//! notifications come back as [`ClientEvent`]s on an mpsc channel owned by the
//! session supervisor.

mod error;
pub mod evolution;
pub mod qr;

use std::path::PathBuf;

use async_trait::async_trait;

pub use error::ClientError;
pub use evolution::{EvolutionClient, EvolutionConfig};
pub use qr::QrPayload;

/// Outgoing message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    Media(MediaMessage),
}

/// A media attachment read from a file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaMessage {
    pub path: PathBuf,
    pub mimetype: String,
    /// Name shown to the recipient.
    pub filename: String,
}

impl MediaMessage {
    pub fn pdf(path: impl Into<PathBuf>, filename: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mimetype: "application/pdf".to_string(),
            filename: filename.into(),
        }
    }
}

/// Opaque delivery receipt returned by the collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub message_id: Option<String>,
}

/// Lifecycle notifications raised by the messaging session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Qr(QrPayload),
    Authenticated,
    Ready,
    AuthFailure(String),
    Disconnected(String),
}

/// Operations the gateway needs from a messaging session.
///
/// Implementations are shared across all requests and the supervisor, and
/// must serialize their own access to the underlying session.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Start (or restart) the session. Pairing progress is reported through
    /// [`ClientEvent`]s, not through the return value.
    async fn initialize(&self) -> Result<(), ClientError>;

    /// Tear down what this process holds for the session. Pairing
    /// credentials kept by the session itself must survive, so a following
    /// `initialize` resumes without a new QR scan.
    async fn destroy(&self) -> Result<(), ClientError>;

    /// Whether `address` belongs to a registered user of the network.
    async fn is_registered_user(&self, address: &str) -> Result<bool, ClientError>;

    /// Deliver a text or media message to `address`.
    async fn send_message(
        &self,
        address: &str,
        content: MessageContent,
    ) -> Result<DeliveryReceipt, ClientError>;
}
