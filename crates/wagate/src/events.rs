//! Session lifecycle events and their fan-out to dashboard viewers.
//!
//! The session supervisor publishes [`SessionEvent`]s onto a single broadcast
//! channel. Every push-channel connection holds its own receiver, so each
//! viewer sees the full stream independently. There is no replay buffer: a
//! viewer only gets events published after it subscribed.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// Greeting pushed to every new viewer before any session event.
pub const GREETING: &str = "Connecting...";

const QR_RECEIVED: &str = "QR Code received, scan please!";
const READY: &str = "Whatsapp is ready!";
const AUTHENTICATED: &str = "Whatsapp is authenticated!";
const AUTH_FAILURE: &str = "Auth failure, restarting...";
const DISCONNECTED: &str = "Whatsapp is disconnected!";

/// A lifecycle event as seen by dashboard viewers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A pairing code was issued; carries a `data:` image URL.
    Qr(String),
    Authenticated,
    Ready,
    AuthFailure(String),
    Disconnected(String),
    /// Free-form status text.
    Status(String),
}

/// One named frame on the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushFrame {
    pub event: &'static str,
    pub data: String,
}

impl PushFrame {
    fn new(event: &'static str, data: impl Into<String>) -> Self {
        Self {
            event,
            data: data.into(),
        }
    }

    pub fn message(data: impl Into<String>) -> Self {
        Self::new("message", data)
    }
}

impl SessionEvent {
    /// Frames emitted to a viewer for this event, in order.
    pub fn frames(&self) -> Vec<PushFrame> {
        match self {
            SessionEvent::Qr(url) => vec![
                PushFrame::new("qr", url.clone()),
                PushFrame::message(QR_RECEIVED),
            ],
            SessionEvent::Ready => vec![PushFrame::new("ready", READY), PushFrame::message(READY)],
            SessionEvent::Authenticated => vec![
                PushFrame::new("authenticated", AUTHENTICATED),
                PushFrame::message(AUTHENTICATED),
            ],
            SessionEvent::AuthFailure(_) => vec![PushFrame::message(AUTH_FAILURE)],
            SessionEvent::Disconnected(_) => vec![PushFrame::message(DISCONNECTED)],
            SessionEvent::Status(text) => vec![PushFrame::message(text.clone())],
        }
    }
}

/// Broadcast channel carrying session events to all viewers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish to every current subscriber. Returns how many received it.
    pub fn publish(&self, event: SessionEvent) -> usize {
        match self.tx.send(event) {
            Ok(n) => n,
            Err(broadcast::error::SendError(event)) => {
                debug!(?event, "No viewers connected, event dropped");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

// ============================================================================
// Tests
// ============================================================================
