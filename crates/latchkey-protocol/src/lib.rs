//! Wire protocol for the lock bridge.
//!
//! Two independent codecs share the primitive encoding helpers from
//! `latchkey-core`:
//!
//! - [`CommandCodec`] builds HMAC-signed [`CommandFrame`]s and encodes them
//!   for the `command_signed_base64` query parameter.
//! - [`WebhookAuthenticator`] produces and checks the `TIMESTAMP` / `HASH`
//!   headers guarding the webhook-management endpoints.
//!
//! [`BridgeEvent`] classifies the JSON payloads the bridge sends to
//! registered webhooks.

pub mod codec;
pub mod event;
pub mod frame;
pub mod webhook;

pub use codec::{CommandCodec, create_command};
pub use event::BridgeEvent;
pub use frame::{CommandFrame, frame_length, signed_payload};
pub use webhook::{
    WebhookAuthHeader, WebhookAuthenticator, WebhookInput, compute_hash, generate_webhook_header,
};
