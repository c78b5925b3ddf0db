//! HTTP client for the bridge's local API.
//!
//! The bridge exposes a small unauthenticated-transport HTTP API on the LAN.
//! Authentication lives in the payloads instead: lock commands are signed
//! frames in a query parameter, and webhook management calls carry a
//! `TIMESTAMP` / `HASH` header pair.
//!
//! # Architecture
//!
//! ```text
//! BridgeClient
//!     │
//!     ├─> CommandCodec (api key) ─────────> GET  /to_lock?command_signed_base64=...
//!     ├─> WebhookAuthenticator (bridge key) ─> GET/POST/DELETE /webhooks
//!     └─> plain request ──────────────────> GET  /status
//! ```
//!
//! # Example Usage
//!
//! ```no_run
//! use latchkey_network::{BridgeClient, BridgeClientConfig, callback_url};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BridgeClientConfig {
//!     address: "192.168.1.20".to_string(),
//!     bridge_key: "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=".to_string(),
//!     api_key: "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=".to_string(),
//!     lock_id: 2,
//!     timeout: Duration::from_secs(5),
//! };
//!
//! let client = BridgeClient::new(config)?;
//!
//! let status = client.status().await?;
//! println!("Battery: {:?}%", status.battery_percentage);
//!
//! client.register_webhook(&callback_url("192.168.1.10", 9005)).await?;
//! client.lock_lock().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Design Principles
//!
//! - **No automatic retry**: a command is signed with the current time, so
//!   the caller decides whether a fresh one should be sent
//! - **Fresh credentials per call**: every command and header is computed at
//!   request time and never cached
//! - **Bridge errors surface verbatim**: non-2xx responses carry the body the
//!   bridge returned

use latchkey_core::{
    Clock, LockAction, LockId, SigningKey, SystemClock, WebhookId,
    constants::{COMMAND_QUERY_PARAM, DEFAULT_REQUEST_TIMEOUT, PATH_STATUS, PATH_TO_LOCK, PATH_WEBHOOKS},
};
use latchkey_protocol::{CommandCodec, WebhookAuthHeader, WebhookAuthenticator, WebhookInput};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Configuration for [`BridgeClient`]
///
/// Both keys are the base64 strings shown in the bridge's API configuration
/// page. The API key signs lock commands; the bridge key authenticates
/// webhook management.
///
/// # Example
///
/// ```
/// use latchkey_network::BridgeClientConfig;
///
/// let config = BridgeClientConfig {
///     address: "192.168.1.20".to_string(),
///     bridge_key: "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=".to_string(),
///     api_key: "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=".to_string(),
///     lock_id: 2,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone)]
pub struct BridgeClientConfig {
    /// Bridge host, optionally with port or `http://` scheme
    pub address: String,

    /// Base64 key for webhook management headers
    pub bridge_key: String,

    /// Base64 key for signing lock commands
    pub api_key: String,

    /// Lock addressed by NORMAL commands
    pub lock_id: u8,

    /// Timeout for each HTTP request
    pub timeout: Duration,
}

impl Default for BridgeClientConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            bridge_key: String::new(),
            api_key: String::new(),
            lock_id: 0,
            timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT),
        }
    }
}

impl std::fmt::Debug for BridgeClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeClientConfig")
            .field("address", &self.address)
            .field("bridge_key", &"[REDACTED]")
            .field("api_key", &"[REDACTED]")
            .field("lock_id", &self.lock_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl BridgeClientConfig {
    /// Check that every required field is present.
    ///
    /// Key contents are checked when the client is built.
    ///
    /// # Errors
    /// Returns `Error::Config` naming the first missing field.
    pub fn validate(&self) -> latchkey_core::Result<()> {
        if self.address.trim().is_empty() {
            return Err(latchkey_core::Error::Config("No bridge address provided".to_string()));
        }
        if self.bridge_key.trim().is_empty() {
            return Err(latchkey_core::Error::Config("No bridge key provided".to_string()));
        }
        if self.api_key.trim().is_empty() {
            return Err(latchkey_core::Error::Config("No API key provided".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(latchkey_core::Error::Config("Request timeout must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Errors that can occur while talking to the bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Invalid configuration, key or command
    #[error("Protocol error: {0}")]
    Protocol(#[from] latchkey_core::Error),

    /// Request did not complete in time
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    /// Transport-level failure
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Bridge answered with a non-2xx status
    #[error("Bridge returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body could not be decoded
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Snapshot returned by `GET /status`.
///
/// Fields the bridge may omit are optional; anything not modelled here is
/// kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeStatus {
    pub battery_percentage: Option<i64>,
    pub battery_type: Option<String>,
    pub bolt_state: Option<String>,
    pub lock_online: Option<i64>,
    pub bridge_mac_wifi: Option<String>,
    pub bridge_mac_ble: Option<String>,
    pub wifi_strength: Option<i64>,
    pub ble_strength: Option<i64>,
    pub webhooks_number: Option<i64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BridgeStatus {
    /// Whether the lock is reachable from the bridge, if reported.
    pub fn is_lock_online(&self) -> Option<bool> {
        self.lock_online.map(|online| online != 0)
    }
}

/// A webhook registered on the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Webhook {
    pub id: WebhookId,
    pub url: String,

    /// `trigger_*` flags and any other fields
    #[serde(flatten)]
    pub triggers: Map<String, Value>,
}

/// Body of `POST /webhooks`, subscribing to every event class.
#[derive(Debug, Serialize)]
struct RegisterWebhook<'a> {
    url: &'a str,
    trigger_state_changed_open: u8,
    trigger_state_changed_latch: u8,
    trigger_state_changed_night_lock: u8,
    trigger_state_changed_unknown: u8,
    trigger_state_goto_open: u8,
    trigger_state_goto_latch: u8,
    trigger_state_goto_night_lock: u8,
    trigger_battery: u8,
    trigger_online_status: u8,
}

impl<'a> RegisterWebhook<'a> {
    fn all_events(url: &'a str) -> Self {
        Self {
            url,
            trigger_state_changed_open: 1,
            trigger_state_changed_latch: 1,
            trigger_state_changed_night_lock: 1,
            trigger_state_changed_unknown: 1,
            trigger_state_goto_open: 1,
            trigger_state_goto_latch: 1,
            trigger_state_goto_night_lock: 1,
            trigger_battery: 1,
            trigger_online_status: 1,
        }
    }
}

/// Callback URL for a [`WebhookListener`](crate::WebhookListener) reachable
/// at `host:port`.
///
/// ```
/// assert_eq!(latchkey_network::callback_url("192.168.1.10", 9005), "http://192.168.1.10:9005/");
/// ```
pub fn callback_url(host: &str, port: u16) -> String {
    format!("http://{host}:{port}/")
}

/// Client for a single bridge and lock
///
/// Holds decoded keys and a pooled `reqwest::Client`. Cloning is cheap
/// enough for per-task use but not needed: every method takes `&self`.
///
/// # Example
///
/// ```no_run
/// use latchkey_network::{BridgeClient, BridgeClientConfig};
///
/// # async fn example(config: BridgeClientConfig) -> Result<(), Box<dyn std::error::Error>> {
/// let client = BridgeClient::new(config)?;
/// client.open_lock().await?;
///
/// for webhook in client.list_webhooks().await? {
///     println!("{} -> {}", webhook.id, webhook.url);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BridgeClient<C = SystemClock> {
    /// `http://host[:port]`, no trailing slash
    base_url: String,

    http: reqwest::Client,
    bridge_key: SigningKey,
    api_key: SigningKey,
    lock_id: LockId,
    codec: CommandCodec<C>,
    auth: WebhookAuthenticator<C>,
    timeout: Duration,
}

impl BridgeClient<SystemClock> {
    /// Create a client that timestamps with the system clock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A required config field is empty (`Error::Config`)
    /// - Either key does not decode to at least 32 bytes (`Error::InvalidSecret`)
    /// - The HTTP client cannot be initialised
    pub fn new(config: BridgeClientConfig) -> Result<Self, BridgeError> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock + Clone> BridgeClient<C> {
    /// Create a client with an injected clock.
    ///
    /// # Errors
    /// See [`BridgeClient::new`].
    pub fn with_clock(config: BridgeClientConfig, clock: C) -> Result<Self, BridgeError> {
        config.validate()?;

        let bridge_key = SigningKey::from_base64(&config.bridge_key)?;
        let api_key = SigningKey::from_base64(&config.api_key)?;
        let base_url = base_url(&config.address);

        let http = reqwest::Client::builder().timeout(config.timeout).build()?;

        debug!(
            base_url = %base_url,
            lock_id = config.lock_id,
            timeout_ms = config.timeout.as_millis() as u64,
            "Creating bridge client"
        );

        Ok(Self {
            base_url,
            http,
            bridge_key,
            api_key,
            lock_id: LockId::new(config.lock_id),
            codec: CommandCodec::with_clock(clock.clone()),
            auth: WebhookAuthenticator::with_clock(clock),
            timeout: config.timeout,
        })
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn lock_id(&self) -> LockId {
        self.lock_id
    }

    /// Send a signed command for `action`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The request fails or times out
    /// - The bridge answers with a non-2xx status
    pub async fn send_command(&self, action: LockAction) -> Result<(), BridgeError> {
        let signed = self.codec.encode(action, self.lock_id, &self.api_key)?;
        let url = format!("{}{}?{}={}", self.base_url, PATH_TO_LOCK, COMMAND_QUERY_PARAM, signed);

        info!(action = %action, lock_id = %self.lock_id, "Sending lock command");

        self.execute(self.http.get(url)).await?;
        debug!(action = %action, "Lock command accepted");
        Ok(())
    }

    /// Open the lock.
    pub async fn open_lock(&self) -> Result<(), BridgeError> {
        self.send_command(LockAction::Open).await
    }

    /// Move the lock to day-lock (latch) mode.
    pub async fn latch_lock(&self) -> Result<(), BridgeError> {
        self.send_command(LockAction::DayLock).await
    }

    /// Fully lock.
    pub async fn lock_lock(&self) -> Result<(), BridgeError> {
        self.send_command(LockAction::Lock).await
    }

    /// Trigger the electronic door opener.
    pub async fn open_electronic_door(&self) -> Result<(), BridgeError> {
        self.send_command(LockAction::OpenElectronicDoor).await
    }

    /// Fetch the bridge status.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the bridge answers with a
    /// non-2xx status, or the body is not a JSON object.
    pub async fn status(&self) -> Result<BridgeStatus, BridgeError> {
        debug!("Requesting bridge status");
        let response = self.execute(self.http.get(self.url(PATH_STATUS))).await?;
        decode_json(response).await
    }

    /// List registered webhooks.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the bridge rejects the
    /// authentication header, or the body is not a webhook list.
    pub async fn list_webhooks(&self) -> Result<Vec<Webhook>, BridgeError> {
        let header = self.auth.header(&self.bridge_key, WebhookInput::list());
        debug!(timestamp = header.timestamp(), "Listing webhooks");

        let request = with_auth(self.http.get(self.url(PATH_WEBHOOKS)), &header);
        let response = self.execute(request).await?;
        decode_json(response).await
    }

    /// Register `callback_url` for every event class.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the bridge rejects it.
    pub async fn register_webhook(&self, callback_url: &str) -> Result<(), BridgeError> {
        let header = self.auth.header(&self.bridge_key, WebhookInput::register(callback_url));
        info!(url = %callback_url, "Registering webhook");

        let request = self
            .http
            .post(self.url(PATH_WEBHOOKS))
            .json(&RegisterWebhook::all_events(callback_url));
        self.execute(with_auth(request, &header)).await?;
        Ok(())
    }

    /// Delete webhook `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the bridge rejects it.
    pub async fn delete_webhook(&self, id: WebhookId) -> Result<(), BridgeError> {
        let header = self.auth.header(&self.bridge_key, WebhookInput::delete(id));
        info!(webhook_id = %id, "Deleting webhook");

        let url = format!("{}{}/{}", self.base_url, PATH_WEBHOOKS, id);
        self.execute(with_auth(self.http.delete(url), &header)).await?;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, BridgeError> {
        let response = request.send().await.map_err(|e| self.request_error(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!("Failed to read rejection body: {}", e.without_url());
                String::new()
            }
        };
        warn!(status = status.as_u16(), "Bridge rejected request");
        Err(BridgeError::Status {
            status: status.as_u16(),
            body,
        })
    }

    fn request_error(&self, e: reqwest::Error) -> BridgeError {
        if e.is_timeout() {
            warn!("Request timeout after {}ms", self.timeout.as_millis());
            return BridgeError::Timeout(self.timeout.as_millis() as u64);
        }

        // The URL may carry a signed command.
        let e = e.without_url();
        error!("Request to bridge failed: {}", e);
        BridgeError::Request(e)
    }
}

fn base_url(address: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}

fn with_auth(request: reqwest::RequestBuilder, header: &WebhookAuthHeader) -> reqwest::RequestBuilder {
    header
        .to_headers()
        .into_iter()
        .fold(request, |request, (name, value)| request.header(name, value))
}

async fn decode_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, BridgeError> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| BridgeError::InvalidResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use latchkey_core::{Error, FixedClock};
    use rstest::rstest;
    use serde_json::json;

    const KEY: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";

    fn config() -> BridgeClientConfig {
        BridgeClientConfig {
            address: "192.168.1.20".to_string(),
            bridge_key: KEY.to_string(),
            api_key: KEY.to_string(),
            lock_id: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_config_default() {
        let config = BridgeClientConfig::default();
        assert_eq!(config.timeout.as_millis(), 5000);
        assert!(config.validate().is_err());
    }

    #[rstest]
    #[case::address(BridgeClientConfig { address: " ".to_string(), ..config() }, "address")]
    #[case::bridge_key(BridgeClientConfig { bridge_key: String::new(), ..config() }, "bridge key")]
    #[case::api_key(BridgeClientConfig { api_key: String::new(), ..config() }, "API key")]
    #[case::timeout(BridgeClientConfig { timeout: Duration::ZERO, ..config() }, "timeout")]
    fn test_config_rejects_missing_field(#[case] config: BridgeClientConfig, #[case] field: &str) {
        match config.validate() {
            Err(Error::Config(message)) => assert!(message.contains(field), "{message}"),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_config_debug_redacts_keys() {
        let debug = format!("{:?}", config());
        assert!(!debug.contains(KEY));
        assert!(debug.contains("192.168.1.20"));
    }

    #[test]
    fn test_new_rejects_short_key() {
        let result = BridgeClient::new(BridgeClientConfig {
            api_key: "AAAA".to_string(),
            ..config()
        });
        assert!(matches!(
            result,
            Err(BridgeError::Protocol(Error::InvalidSecret { .. }))
        ));
    }

    #[test]
    fn test_new_rejects_missing_address() {
        let result = BridgeClient::with_clock(
            BridgeClientConfig {
                address: String::new(),
                ..config()
            },
            FixedClock(1),
        );
        assert!(matches!(result, Err(BridgeError::Protocol(Error::Config(_)))));
    }

    #[rstest]
    #[case("192.168.1.20", "http://192.168.1.20")]
    #[case("192.168.1.20:8080", "http://192.168.1.20:8080")]
    #[case("http://bridge.local/", "http://bridge.local")]
    #[case(" 10.0.0.5 ", "http://10.0.0.5")]
    fn test_base_url(#[case] address: &str, #[case] expected: &str) {
        assert_eq!(base_url(address), expected);
    }

    #[test]
    fn test_client_exposes_settings() {
        let client = BridgeClient::with_clock(config(), FixedClock(1)).unwrap();
        assert_eq!(client.base_url(), "http://192.168.1.20");
        assert_eq!(client.lock_id(), LockId::new(2));
    }

    #[test]
    fn test_callback_url() {
        assert_eq!(callback_url("10.0.0.2", 9005), "http://10.0.0.2:9005/");
    }

    #[test]
    fn test_register_body_subscribes_everything() {
        let body = serde_json::to_value(RegisterWebhook::all_events("http://h:1/")).unwrap();
        let object = body.as_object().unwrap();

        assert_eq!(object["url"], "http://h:1/");
        let triggers: Vec<_> = object.iter().filter(|(k, _)| k.starts_with("trigger_")).collect();
        assert_eq!(triggers.len(), 9);
        assert!(triggers.iter().all(|(_, v)| **v == json!(1)));
    }

    #[test]
    fn test_status_deserialize_keeps_unknown_fields() {
        let status: BridgeStatus = serde_json::from_value(json!({
            "battery_percentage": 78,
            "bolt_state": "day_lock",
            "lock_online": 1,
            "ip_address": "192.168.1.20",
        }))
        .unwrap();

        assert_eq!(status.battery_percentage, Some(78));
        assert_eq!(status.bolt_state.as_deref(), Some("day_lock"));
        assert_eq!(status.is_lock_online(), Some(true));
        assert_eq!(status.wifi_strength, None);
        assert_eq!(status.extra["ip_address"], "192.168.1.20");
    }

    #[test]
    fn test_webhook_deserialize() {
        let webhooks: Vec<Webhook> = serde_json::from_value(json!([
            { "id": 3, "url": "http://10.0.0.2:9005/", "trigger_battery": 1 }
        ]))
        .unwrap();

        assert_eq!(webhooks[0].id, WebhookId::new(3));
        assert_eq!(webhooks[0].triggers["trigger_battery"], 1);
    }
}
