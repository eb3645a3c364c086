#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use wagate::client::{ClientError, ClientEvent, DeliveryReceipt, MessageContent, MessagingClient};
use wagate::config::ServerConfig;
use wagate::events::EventBus;
use wagate::phone::PhoneFormatter;
use wagate::server::{AppState, build_app};
use wagate::session::{ReconnectPolicy, SessionSupervisor};
use wagate::staging::AttachmentStager;

/// What the mock saw for one `send_message` call.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub address: String,
    pub text: Option<String>,
    /// For media: file name shown to the recipient and the bytes that were on
    /// disk at send time.
    pub media: Option<(String, Vec<u8>)>,
    pub media_path: Option<std::path::PathBuf>,
}

#[derive(Default)]
pub struct MockClient {
    pub registered: bool,
    pub fail_registration: bool,
    pub fail_send: bool,
    /// Stall every registration check this long.
    pub delay: Option<std::time::Duration>,
    pub registration_checks: Mutex<Vec<String>>,
    pub sent: Mutex<Vec<SentMessage>>,
}

impl MockClient {
    pub fn registered() -> Self {
        Self {
            registered: true,
            ..Default::default()
        }
    }

    pub fn unregistered() -> Self {
        Self::default()
    }

    pub fn checks(&self) -> Vec<String> {
        self.registration_checks.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingClient for MockClient {
    async fn initialize(&self) -> Result<(), ClientError> {
        Ok(())
    }

    async fn destroy(&self) -> Result<(), ClientError> {
        Ok(())
    }

    async fn is_registered_user(&self, address: &str) -> Result<bool, ClientError> {
        self.registration_checks
            .lock()
            .unwrap()
            .push(address.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_registration {
            return Err(ClientError::NotConnected);
        }
        Ok(self.registered)
    }

    async fn send_message(
        &self,
        address: &str,
        content: MessageContent,
    ) -> Result<DeliveryReceipt, ClientError> {
        let record = match content {
            MessageContent::Text(text) => SentMessage {
                address: address.to_string(),
                text: Some(text),
                media: None,
                media_path: None,
            },
            MessageContent::Media(media) => {
                let bytes = std::fs::read(&media.path)?;
                SentMessage {
                    address: address.to_string(),
                    text: None,
                    media: Some((media.filename, bytes)),
                    media_path: Some(media.path),
                }
            }
        };
        self.sent.lock().unwrap().push(record);

        if self.fail_send {
            return Err(ClientError::Api {
                status: 500,
                message: "delivery failed".to_string(),
            });
        }
        Ok(DeliveryReceipt {
            message_id: Some("ABC123".to_string()),
        })
    }
}

/// Token the test router expects on `/webhook/bridge`.
pub const WEBHOOK_SECRET: &str = "bridge-secret";

pub struct TestApp {
    pub router: Router,
    pub client: Arc<MockClient>,
    pub bus: EventBus,
    pub staging: TempDir,
    pub shutdown: CancellationToken,
    pub client_events: mpsc::UnboundedReceiver<ClientEvent>,
}

pub async fn test_app(client: MockClient) -> TestApp {
    test_app_with(client, ServerConfig::default()).await
}

pub async fn test_app_with(client: MockClient, server: ServerConfig) -> TestApp {
    let client = Arc::new(client);
    let staging = TempDir::new().unwrap();
    let stager = AttachmentStager::new(staging.path()).await.unwrap();
    let bus = EventBus::new(16);
    let (_supervisor, session) =
        SessionSupervisor::new(client.clone(), bus.clone(), ReconnectPolicy::default());
    let (tx, rx) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();

    let state = AppState {
        client: client.clone(),
        phone: PhoneFormatter::default(),
        stager,
        events: bus.clone(),
        session,
        client_events: Some(tx),
        webhook_secret: Some(WEBHOOK_SECRET.to_string()),
        keep_alive_interval_seconds: 15,
        shutdown: shutdown.clone(),
    };

    TestApp {
        router: build_app(state, &server),
        client,
        bus,
        staging,
        shutdown,
        client_events: rx,
    }
}

pub async fn post_json(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(router, request).await
}

pub async fn post_raw(
    router: &Router,
    uri: &str,
    content_type: &str,
    body: &'static str,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", content_type)
        .body(Body::from(body))
        .unwrap();
    send(router, request).await
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

/// Number of entries left in the staging directory.
pub fn staged_files(app: &TestApp) -> usize {
    std::fs::read_dir(app.staging.path()).unwrap().count()
}
