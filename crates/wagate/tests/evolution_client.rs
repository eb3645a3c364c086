//! `EvolutionClient` against a mocked bridge.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wagate::client::{
    ClientError, ClientEvent, EvolutionClient, EvolutionConfig, MediaMessage, MessageContent,
    MessagingClient, QrPayload,
};
use wagate::events::EventBus;
use wagate::session::{ReconnectPolicy, SessionStatus, SessionSupervisor};

const WAIT: Duration = Duration::from_secs(5);

fn config_for(server: &MockServer) -> EvolutionConfig {
    EvolutionConfig {
        api_url: server.uri(),
        api_key: "secret".to_string(),
        instance_name: "test".to_string(),
        webhook_url: None,
        webhook_secret: None,
    }
}

fn client_for(
    server: &MockServer,
) -> (EvolutionClient, mpsc::UnboundedReceiver<ClientEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EvolutionClient::new(&config_for(server), tx).unwrap(), rx)
}

#[tokio::test]
async fn initialize_emits_qr_from_create_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/instance/create"))
        .and(header("apikey", "secret"))
        .and(body_partial_json(json!({"instanceName": "test", "qrcode": true})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "instance": {"instanceName": "test", "status": "created"},
            "qrcode": {"code": "2@pairing-code"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, mut events) = client_for(&server);
    client.initialize().await.unwrap();

    assert_eq!(
        events.try_recv().unwrap(),
        ClientEvent::Qr(QrPayload::Code("2@pairing-code".to_string()))
    );
}

#[tokio::test]
async fn initialize_reconnects_existing_instance() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/instance/create"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": "This name \"test\" is already in use."
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/instance/connect/test"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"instance": {"state": "open"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (client, mut events) = client_for(&server);
    client.initialize().await.unwrap();

    assert_eq!(events.try_recv().unwrap(), ClientEvent::Authenticated);
    assert_eq!(events.try_recv().unwrap(), ClientEvent::Ready);
}

#[tokio::test]
async fn initialize_surfaces_bridge_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/instance/create"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let (client, mut events) = client_for(&server);
    let err = client.initialize().await.unwrap_err();

    assert!(matches!(err, ClientError::Api { status: 401, .. }));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn registration_check_sends_bare_number() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/whatsappNumbers/test"))
        .and(body_partial_json(json!({"numbers": ["628123456789"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"exists": true, "jid": "628123456789@s.whatsapp.net", "number": "628123456789"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _events) = client_for(&server);
    assert!(client.is_registered_user("628123456789@c.us").await.unwrap());
}

#[tokio::test]
async fn registration_check_empty_answer_is_unregistered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/whatsappNumbers/test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let (client, _events) = client_for(&server);
    assert!(!client.is_registered_user("628123456789@c.us").await.unwrap());
}

#[tokio::test]
async fn send_text_returns_message_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/message/sendText/test"))
        .and(body_partial_json(json!({"number": "628123456789", "text": "hello"})))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"key": {"id": "BAE5F00D"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (client, _events) = client_for(&server);
    let receipt = client
        .send_message("628123456789@c.us", MessageContent::Text("hello".to_string()))
        .await
        .unwrap();

    assert_eq!(receipt.message_id.as_deref(), Some("BAE5F00D"));
}

#[tokio::test]
async fn send_media_uploads_document_as_base64() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/message/sendMedia/test"))
        .and(body_partial_json(json!({
            "number": "628123456789",
            "mediatype": "document",
            "mimetype": "application/pdf",
            "media": "JVBERi0=",
            "fileName": "invoice.pdf"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("staged.pdf");
    std::fs::write(&file, b"%PDF-").unwrap();

    let (client, _events) = client_for(&server);
    let receipt = client
        .send_message(
            "628123456789@c.us",
            MessageContent::Media(MediaMessage::pdf(&file, "invoice.pdf")),
        )
        .await
        .unwrap();

    assert_eq!(receipt.message_id, None);
}

#[tokio::test]
async fn destroy_never_logs_out() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (client, _events) = client_for(&server);
    client.destroy().await.unwrap();
    server.verify().await;
}

#[tokio::test]
async fn truncated_response_is_an_error() {
    // A bridge that promises more body than it sends, then hangs up
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 4096];
        let _ = socket.read(&mut buf).await;
        let _ = socket
            .write_all(
                b"HTTP/1.1 201 Created\r\ncontent-type: application/json\r\n\
                  content-length: 64\r\n\r\n{\"key\"",
            )
            .await;
    });

    let config = EvolutionConfig {
        api_url: format!("http://{addr}"),
        instance_name: "test".to_string(),
        ..Default::default()
    };
    let (tx, _rx) = mpsc::unbounded_channel();
    let client = EvolutionClient::new(&config, tx).unwrap();
    let err = client
        .send_message("628123456789@c.us", MessageContent::Text("hi".to_string()))
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Request(_)));
}

async fn wait_until_ready(status: &SessionStatus) {
    timeout(WAIT, async {
        while !status.is_ready() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

async fn connect_calls(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/instance/connect/test")
        .count()
}

#[tokio::test]
async fn disconnect_restart_keeps_device_paired() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/instance/create"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": "This name \"test\" is already in use."
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/instance/connect/test"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"instance": {"state": "open"}})),
        )
        .mount(&server)
        .await;

    let (tx, rx) = mpsc::unbounded_channel();
    let client = Arc::new(EvolutionClient::new(&config_for(&server), tx.clone()).unwrap());
    let (supervisor, status) =
        SessionSupervisor::new(client, EventBus::new(16), ReconnectPolicy::default());
    let cancel = CancellationToken::new();
    let handle = supervisor.spawn(rx, cancel.clone());
    wait_until_ready(&status).await;

    tx.send(ClientEvent::Disconnected("connection closed (status 428)".to_string()))
        .unwrap();
    timeout(WAIT, async {
        while connect_calls(&server).await < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    wait_until_ready(&status).await;

    cancel.cancel();
    handle.await.unwrap();
    server.verify().await;
}
