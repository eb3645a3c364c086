//! Messaging client backed by an Evolution-API style WhatsApp bridge.
//!
//! The bridge owns the actual WhatsApp Web session. We drive it over HTTP
//! (`apikey` header auth) and it reports lifecycle changes by POSTing webhooks
//! back to us, which [`parse_webhook`] turns into [`ClientEvent`]s.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use super::{ClientError, ClientEvent, DeliveryReceipt, MessageContent, MessagingClient, QrPayload};

/// Connection settings for the bridge.
#[derive(Debug, Clone, Deserialize)]
pub struct EvolutionConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_instance_name")]
    pub instance_name: String,
    /// Where the bridge should POST lifecycle webhooks. When unset the bridge
    /// is expected to be configured out of band.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Shared secret the bridge must present on `/webhook/bridge`. It is
    /// appended to `webhook_url` as the `token` query parameter.
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: String::new(),
            instance_name: default_instance_name(),
            webhook_url: None,
            webhook_secret: None,
        }
    }
}

fn default_api_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_instance_name() -> String {
    "wagate".to_string()
}

pub struct EvolutionClient {
    http: Client,
    base_url: Url,
    api_key: String,
    instance_name: String,
    webhook_url: Option<String>,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl EvolutionClient {
    pub fn new(
        config: &EvolutionConfig,
        events: mpsc::UnboundedSender<ClientEvent>,
    ) -> Result<Self, ClientError> {
        // `Url::join` drops the last path segment unless the base ends in '/'
        let mut api_url = config.api_url.clone();
        if !api_url.ends_with('/') {
            api_url.push('/');
        }

        let webhook_url = match (&config.webhook_url, &config.webhook_secret) {
            (Some(url), Some(secret)) => {
                let mut url = Url::parse(url)?;
                url.query_pairs_mut().append_pair("token", secret);
                Some(url.to_string())
            }
            (url, _) => url.clone(),
        };

        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(&api_url)?,
            api_key: config.api_key.clone(),
            instance_name: config.instance_name.clone(),
            webhook_url,
            events,
        })
    }

    async fn call(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<(StatusCode, String), ClientError> {
        let url = self.base_url.join(endpoint)?;
        let mut req = self
            .http
            .request(method, url)
            .header("apikey", &self.api_key);
        if let Some(body) = body {
            req = req.json(body);
        }

        let response = req.send().await?;
        let status = response.status();
        let text = response.text().await?;
        Ok((status, text))
    }

    /// Call an endpoint and fail on any non-2xx status.
    async fn call_ok(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Value, ClientError> {
        let (status, text) = self.call(method, endpoint, body).await?;
        if !status.is_success() {
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: text,
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ClientError::UnexpectedResponse(e.to_string()))
    }

    fn emit(&self, event: ClientEvent) {
        if self.events.send(event).is_err() {
            warn!("Session supervisor is gone, dropping client event");
        }
    }

    /// Publish whatever the bridge told us about the connection right after
    /// create/connect.
    fn report_connection(&self, response: &Value) {
        if let Some(qr) = extract_qr(response) {
            info!(instance = %self.instance_name, "QR code received from bridge");
            self.emit(ClientEvent::Qr(qr));
        } else if connection_state(response) == Some("open") {
            info!(instance = %self.instance_name, "Bridge reports session already open");
            self.emit(ClientEvent::Authenticated);
            self.emit(ClientEvent::Ready);
        } else {
            debug!(instance = %self.instance_name, "No QR code in bridge response");
        }
    }
}

#[async_trait]
impl MessagingClient for EvolutionClient {
    async fn initialize(&self) -> Result<(), ClientError> {
        let mut body = json!({
            "instanceName": self.instance_name,
            "qrcode": true,
            "integration": "WHATSAPP-BAILEYS",
        });
        if let Some(ref webhook) = self.webhook_url {
            body["webhook"] = json!({
                "url": webhook,
                "events": ["QRCODE_UPDATED", "CONNECTION_UPDATE"],
            });
        }

        let (status, text) = self
            .call(Method::POST, "instance/create", Some(&body))
            .await?;

        let response: Value = if status.is_success() {
            serde_json::from_str(&text).unwrap_or_default()
        } else if is_already_exists(&text) {
            // The instance survived a previous run; reconnect to it instead
            debug!(instance = %self.instance_name, "Instance exists, connecting");
            let endpoint = format!("instance/connect/{}", self.instance_name);
            self.call_ok(Method::GET, &endpoint, None).await?
        } else {
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: text,
            });
        };

        self.report_connection(&response);
        Ok(())
    }

    /// The bridge owns the WhatsApp socket and the pairing credentials, and
    /// we hold nothing for the instance besides its name. Logging out here
    /// would unpair the device, so teardown is local only; the next
    /// `initialize` reattaches through `instance/connect`.
    async fn destroy(&self) -> Result<(), ClientError> {
        debug!(instance = %self.instance_name, "Detached from bridge instance");
        Ok(())
    }

    async fn is_registered_user(&self, address: &str) -> Result<bool, ClientError> {
        let endpoint = format!("chat/whatsappNumbers/{}", self.instance_name);
        let body = json!({ "numbers": [bridge_number(address)] });
        let response = self.call_ok(Method::POST, &endpoint, Some(&body)).await?;

        let checks: Vec<NumberCheck> = serde_json::from_value(response)
            .map_err(|e| ClientError::UnexpectedResponse(e.to_string()))?;
        Ok(checks.first().is_some_and(|c| c.exists))
    }

    async fn send_message(
        &self,
        address: &str,
        content: MessageContent,
    ) -> Result<DeliveryReceipt, ClientError> {
        let number = bridge_number(address);
        let (endpoint, body) = match content {
            MessageContent::Text(text) => (
                format!("message/sendText/{}", self.instance_name),
                json!({ "number": number, "text": text }),
            ),
            MessageContent::Media(media) => {
                let data = tokio::fs::read(&media.path).await?;
                (
                    format!("message/sendMedia/{}", self.instance_name),
                    json!({
                        "number": number,
                        "mediatype": "document",
                        "mimetype": media.mimetype,
                        "media": STANDARD.encode(data),
                        "fileName": media.filename,
                    }),
                )
            }
        };

        let response = self.call_ok(Method::POST, &endpoint, Some(&body)).await?;
        Ok(DeliveryReceipt {
            message_id: response["key"]["id"].as_str().map(str::to_string),
        })
    }
}

#[derive(Deserialize)]
struct NumberCheck {
    #[serde(default)]
    exists: bool,
}

/// The bridge addresses users by bare number, without the `@c.us` suffix.
fn bridge_number(address: &str) -> &str {
    address.split_once('@').map_or(address, |(number, _)| number)
}

fn is_already_exists(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("already") && (lower.contains("instance") || lower.contains("name"))
}

fn connection_state(response: &Value) -> Option<&str> {
    response["instance"]["state"]
        .as_str()
        .or_else(|| response["state"].as_str())
}

/// Pull a QR payload out of the shapes the bridge uses across versions.
fn extract_qr(value: &Value) -> Option<QrPayload> {
    let image = value["qrcode"]["base64"]
        .as_str()
        .or_else(|| value["base64"].as_str())
        .or_else(|| value["qrcode"].as_str().filter(|s| s.starts_with("data:")))
        .filter(|s| !s.is_empty());
    if let Some(image) = image {
        return Some(QrPayload::Image(image.to_string()));
    }

    value["qrcode"]["code"]
        .as_str()
        .or_else(|| value["code"].as_str())
        .filter(|s| !s.is_empty())
        .map(|code| QrPayload::Code(code.to_string()))
}

/// Translate a bridge webhook into client events.
///
/// Unknown events and intermediate states (`connecting`) produce nothing.
pub fn parse_webhook(payload: &Value) -> Vec<ClientEvent> {
    let event = payload["event"]
        .as_str()
        .unwrap_or_default()
        .to_lowercase()
        .replace('_', ".");
    let data = &payload["data"];

    match event.as_str() {
        "qrcode.updated" => extract_qr(data).map(ClientEvent::Qr).into_iter().collect(),
        "connection.update" => match data["state"].as_str().unwrap_or_default() {
            "open" => vec![ClientEvent::Authenticated, ClientEvent::Ready],
            "close" => {
                let reason = match data["statusReason"].as_u64() {
                    Some(code) => format!("connection closed (status {code})"),
                    None => "connection closed".to_string(),
                };
                // 401 means the pairing was revoked
                if data["statusReason"].as_u64() == Some(401) {
                    vec![ClientEvent::AuthFailure(reason)]
                } else {
                    vec![ClientEvent::Disconnected(reason)]
                }
            }
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

// ============================================================================
// Tests
// ============================================================================
