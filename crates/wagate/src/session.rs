//! Session supervisor.
//!
//! Owns the lifecycle of the single messaging session: initializes it at
//! start-up, follows the collaborator's lifecycle events, restarts it after a
//! disconnect or auth failure, and publishes every transition onto the
//! [`EventBus`].
//!
//! ```text
//!  Disconnected ─▶ Initializing ─▶ AwaitingScan ─▶ Authenticated ─▶ Ready
//!       ▲               ▲                │               │            │
//!       │               └── auth_failure ┘               │            │
//!       └──────────────── disconnected ◀─────────────────┴────────────┘
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ClientEvent, MessagingClient};
use crate::events::{EventBus, SessionEvent};

// ============================================================================
// SessionState
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Initializing,
    AwaitingScan,
    Authenticated,
    Ready,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Initializing => "initializing",
            SessionState::AwaitingScan => "awaiting_scan",
            SessionState::Authenticated => "authenticated",
            SessionState::Ready => "ready",
        };
        f.write_str(s)
    }
}

/// Current state plus when it was entered.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StateSnapshot {
    pub state: SessionState,
    pub since: DateTime<Utc>,
}

impl StateSnapshot {
    fn now(state: SessionState) -> Self {
        Self {
            state,
            since: Utc::now(),
        }
    }
}

/// Read-only view of the session state for HTTP handlers.
#[derive(Clone)]
pub struct SessionStatus {
    rx: watch::Receiver<StateSnapshot>,
}

impl SessionStatus {
    pub fn current(&self) -> StateSnapshot {
        *self.rx.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.current().state == SessionState::Ready
    }

    /// Wait until the state satisfies `f`.
    #[cfg(test)]
    pub(crate) async fn wait_for(
        &mut self,
        f: impl FnMut(&StateSnapshot) -> bool,
    ) -> Option<StateSnapshot> {
        self.rx.wait_for(f).await.ok().map(|s| *s)
    }
}

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Backoff and attempt limit for (re)initializing the session.
///
/// Attempt 0 runs immediately; attempt `n` waits
/// `min(initial_backoff * 2^(n-1), max_backoff)`. The same schedule governs
/// retries of a failing `initialize` and consecutive restarts of a session
/// that keeps dropping before it becomes ready.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectPolicy {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// `None` retries forever.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_attempts: None,
        }
    }
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

impl ReconnectPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt < max)
    }
}

// ============================================================================
// SessionSupervisor
// ============================================================================

pub struct SessionSupervisor {
    client: Arc<dyn MessagingClient>,
    bus: EventBus,
    policy: ReconnectPolicy,
    state_tx: watch::Sender<StateSnapshot>,
    /// Restarts since the session was last ready.
    restarts: u32,
    /// Set once `restarts` hits the policy limit; cleared on `Ready`.
    exhausted: bool,
}

impl SessionSupervisor {
    pub fn new(
        client: Arc<dyn MessagingClient>,
        bus: EventBus,
        policy: ReconnectPolicy,
    ) -> (Self, SessionStatus) {
        let (state_tx, rx) = watch::channel(StateSnapshot::now(SessionState::Disconnected));
        let supervisor = Self {
            client,
            bus,
            policy,
            state_tx,
            restarts: 0,
            exhausted: false,
        };
        (supervisor, SessionStatus { rx })
    }

    /// Run the supervisor until `cancel` fires or the event channel closes.
    /// The session is destroyed on the way out.
    pub fn spawn(
        self,
        events: mpsc::UnboundedReceiver<ClientEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(events, cancel).await })
    }

    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<ClientEvent>,
        cancel: CancellationToken,
    ) {
        debug!("Session supervisor started");
        self.connect(&cancel).await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Session supervisor cancelled");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.handle(event, &cancel).await,
                    None => {
                        debug!("Client event channel closed");
                        break;
                    }
                }
            }
        }

        if let Err(e) = self.client.destroy().await {
            warn!(error = %e, "Failed to destroy session on shutdown");
        }
        self.set_state(SessionState::Disconnected);
        debug!("Session supervisor stopped");
    }

    async fn handle(&mut self, event: ClientEvent, cancel: &CancellationToken) {
        match event {
            ClientEvent::Qr(payload) => match payload.to_data_url() {
                Ok(url) => {
                    info!("QR code received, waiting for scan");
                    self.set_state(SessionState::AwaitingScan);
                    self.bus.publish(SessionEvent::Qr(url));
                }
                Err(e) => {
                    warn!(error = %e, "Failed to render QR code");
                    self.bus
                        .publish(SessionEvent::Status("Failed to render QR code".to_string()));
                }
            },
            ClientEvent::Authenticated => {
                info!("Session authenticated");
                self.set_state(SessionState::Authenticated);
                self.bus.publish(SessionEvent::Authenticated);
            }
            ClientEvent::Ready => {
                info!("Session ready");
                self.restarts = 0;
                self.exhausted = false;
                self.set_state(SessionState::Ready);
                self.bus.publish(SessionEvent::Ready);
            }
            ClientEvent::AuthFailure(reason) => {
                warn!(%reason, "Session auth failure, restarting");
                self.bus.publish(SessionEvent::AuthFailure(reason));
                self.restart(cancel).await;
            }
            ClientEvent::Disconnected(reason) => {
                warn!(%reason, "Session disconnected, restarting");
                self.set_state(SessionState::Disconnected);
                self.bus.publish(SessionEvent::Disconnected(reason));
                self.restart(cancel).await;
            }
        }
    }

    /// One destroy followed by a fresh initialize, after the backoff for this
    /// restart. Stops restarting once the policy limit is reached.
    async fn restart(&mut self, cancel: &CancellationToken) {
        if !self.policy.allows(self.restarts) {
            if !self.exhausted {
                warn!(restarts = self.restarts, "Giving up on restarting the session");
                self.exhausted = true;
                self.bus.publish(SessionEvent::Status(format!(
                    "Gave up reconnecting after {} restarts",
                    self.restarts
                )));
            }
            return;
        }

        let delay = self.policy.delay_for(self.restarts);
        self.restarts += 1;
        if !delay.is_zero() {
            debug!(
                restart = self.restarts,
                delay_ms = delay.as_millis() as u64,
                "Backing off before restart"
            );
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if let Err(e) = self.client.destroy().await {
            warn!(error = %e, "Failed to destroy session before restart");
        }
        self.connect(cancel).await;
    }

    /// Initialize the session, retrying failures per the reconnect policy.
    async fn connect(&self, cancel: &CancellationToken) {
        let mut attempt = 0u32;
        loop {
            if !self.policy.allows(attempt) {
                warn!(attempts = attempt, "Giving up on session initialization");
                self.set_state(SessionState::Disconnected);
                self.bus.publish(SessionEvent::Status(format!(
                    "Could not connect after {attempt} attempts"
                )));
                return;
            }

            let delay = self.policy.delay_for(attempt);
            if !delay.is_zero() {
                debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Backing off before reconnect"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            self.set_state(SessionState::Initializing);
            match self.client.initialize().await {
                Ok(()) => {
                    info!(attempt, "Session initialized");
                    return;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Session initialization failed");
                    attempt += 1;
                }
            }
        }
    }

    fn set_state(&self, state: SessionState) {
        self.state_tx.send_if_modified(|current| {
            if current.state == state {
                return false;
            }
            *current = StateSnapshot::now(state);
            true
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
