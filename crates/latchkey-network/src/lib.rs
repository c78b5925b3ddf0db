//! HTTP layer for talking to a lock bridge.
//!
//! This crate wraps the codecs from `latchkey-protocol` in the two network
//! collaborators a client needs:
//!
//! # Components
//!
//! - **BridgeClient**: issues signed lock commands and manages webhooks over
//!   the bridge's local HTTP API
//! - **WebhookListener**: receives the events the bridge POSTs back and fans
//!   them out to subscribers
//!
//! # Example
//!
//! ```no_run
//! use latchkey_network::{BridgeClient, BridgeClientConfig, WebhookListener, WebhookListenerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = BridgeClient::new(BridgeClientConfig {
//!     address: "192.168.1.20".to_string(),
//!     bridge_key: "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=".to_string(),
//!     api_key: "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=".to_string(),
//!     lock_id: 2,
//!     ..Default::default()
//! })?;
//!
//! let mut listener = WebhookListener::new(WebhookListenerConfig::default());
//! let mut events = listener.subscribe();
//! listener.start().await?;
//!
//! client.open_lock().await?;
//! let event = events.recv().await?;
//! println!("Bridge reported: {:?}", event);
//!
//! listener.stop().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod listener;

pub use client::{BridgeClient, BridgeClientConfig, BridgeError, BridgeStatus, Webhook, callback_url};
pub use listener::{ListenerError, WebhookListener, WebhookListenerConfig};
