//! Configuration file handling.
//!
//! ```toml
//! [bridge]
//! address = "192.168.1.20"
//! bridge_key = "..."
//! api_key = "..."
//! lock_id = 2
//! timeout_ms = 5000
//!
//! [listener]
//! bind = "0.0.0.0:9005"
//! callback_host = "192.168.1.10"
//! verify = false
//! tolerance_secs = 300
//! ```

use latchkey_core::{
    SigningKey,
    constants::{DEFAULT_LISTEN_PORT, DEFAULT_REQUEST_TIMEOUT, DEFAULT_WEBHOOK_TOLERANCE_SECS},
};
use latchkey_network::{BridgeClientConfig, WebhookListenerConfig};
use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Whole configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub bridge: BridgeSection,
    pub listener: ListenerSection,
}

/// `[bridge]` table.
#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeSection {
    pub address: String,
    pub bridge_key: String,
    pub api_key: String,
    pub lock_id: u8,
    pub timeout_ms: u64,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            address: String::new(),
            bridge_key: String::new(),
            api_key: String::new(),
            lock_id: 0,
            timeout_ms: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl fmt::Debug for BridgeSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeSection")
            .field("address", &self.address)
            .field("bridge_key", &redacted(&self.bridge_key))
            .field("api_key", &redacted(&self.api_key))
            .field("lock_id", &self.lock_id)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() { "<unset>" } else { "[REDACTED]" }
}

/// `[listener]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListenerSection {
    pub bind: SocketAddr,
    /// Host the bridge should call back; required to register without an
    /// explicit URL.
    pub callback_host: Option<String>,
    pub channel_capacity: usize,
    /// Check `TIMESTAMP` / `HASH` on inbound webhooks with the bridge key.
    pub verify: bool,
    pub tolerance_secs: u32,
}

impl Default for ListenerSection {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_LISTEN_PORT)),
            callback_host: None,
            channel_capacity: 64,
            verify: false,
            tolerance_secs: DEFAULT_WEBHOOK_TOLERANCE_SECS,
        }
    }
}

impl AppConfig {
    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Parse and validate TOML content.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Bridge address and keys are checked by the commands that need them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bridge.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "Bridge timeout must be greater than 0".to_string(),
            ));
        }
        if self.listener.channel_capacity == 0 {
            return Err(ConfigError::Validation(
                "Listener channel capacity must be greater than 0".to_string(),
            ));
        }
        if self.listener.verify && self.bridge.bridge_key.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Webhook verification requires a bridge key".to_string(),
            ));
        }
        if let Some(host) = &self.listener.callback_host
            && (host.trim().is_empty() || host.contains('/'))
        {
            return Err(ConfigError::Validation(
                "Callback host must be a bare host name or IP address".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bridge_config(&self) -> BridgeClientConfig {
        BridgeClientConfig {
            address: self.bridge.address.clone(),
            bridge_key: self.bridge.bridge_key.clone(),
            api_key: self.bridge.api_key.clone(),
            lock_id: self.bridge.lock_id,
            timeout: Duration::from_millis(self.bridge.timeout_ms),
        }
    }

    /// Listener settings, decoding the bridge key when verification is on.
    pub fn listener_config(&self) -> latchkey_core::Result<WebhookListenerConfig> {
        let verify_key = if self.listener.verify {
            Some(SigningKey::from_base64(&self.bridge.bridge_key)?)
        } else {
            None
        };

        Ok(WebhookListenerConfig {
            bind_addr: self.listener.bind,
            channel_capacity: self.listener.channel_capacity,
            verify_key,
            tolerance: self.listener.tolerance_secs,
        })
    }

    /// Callback URL built from `callback_host` and the listener port.
    pub fn callback_url(&self) -> Option<String> {
        self.listener
            .callback_host
            .as_deref()
            .map(|host| latchkey_network::callback_url(host.trim(), self.listener.bind.port()))
    }
}
