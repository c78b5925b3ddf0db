//! Webhook-management authentication.
//!
//! Calls to the bridge's `/webhooks` endpoints carry two headers:
//!
//! | Header | Value |
//! |--------|-------|
//! | `TIMESTAMP` | Unix seconds, decimal |
//! | `HASH` | lowercase hex of `SHA256(input ‖ timestamp (8, BE) ‖ key (32))` |
//!
//! `input` depends on the endpoint being called; see [`WebhookInput`].
//!
//! # Security Note
//!
//! This is a plain hash with the key as a suffix, not an HMAC. It must stay
//! bit-for-bit compatible with the bridge firmware, so it is reproduced
//! exactly.
//!
//! # Usage
//!
//! ```
//! use latchkey_core::{FixedClock, SigningKey, WebhookId};
//! use latchkey_protocol::{WebhookAuthenticator, WebhookInput};
//!
//! let key = SigningKey::from_bytes([0u8; 32]);
//! let auth = WebhookAuthenticator::with_clock(FixedClock(1_700_000_000));
//!
//! let header = auth.header(&key, &WebhookInput::delete(WebhookId::new(7)));
//! assert_eq!(header.timestamp_string(), "1700000000");
//! assert_eq!(header.hash().len(), 64);
//! ```

use latchkey_core::{
    Clock, Error, Result, SigningKey, SystemClock, WebhookId,
    clock::timestamp_field,
    constants::{DIGEST_LENGTH, HASH_HEX_LENGTH, HEADER_HASH, HEADER_TIMESTAMP, WEBHOOK_ALL_EVENTS_FLAG},
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, trace};

/// Endpoint-specific bytes hashed ahead of the timestamp and key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookInput(Vec<u8>);

impl WebhookInput {
    /// Input for listing webhooks: empty.
    pub fn list() -> Self {
        WebhookInput(Vec::new())
    }

    /// Input for registering `callback_url` for every event class.
    ///
    /// `url (UTF-8) ‖ WEBHOOK_ALL_EVENTS_FLAG (4, BE)`
    pub fn register(callback_url: &str) -> Self {
        let mut bytes = Vec::with_capacity(callback_url.len() + 4);
        bytes.extend_from_slice(callback_url.as_bytes());
        bytes.extend_from_slice(&WEBHOOK_ALL_EVENTS_FLAG.to_be_bytes());
        WebhookInput(bytes)
    }

    /// Input for deleting webhook `id`: its 8-byte big-endian field.
    pub fn delete(id: WebhookId) -> Self {
        WebhookInput(id.to_field().to_vec())
    }

    /// Arbitrary input, e.g. a raw request body.
    pub fn raw(bytes: impl Into<Vec<u8>>) -> Self {
        WebhookInput(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for WebhookInput {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// The `TIMESTAMP` / `HASH` header pair.
///
/// Computed fresh for every request and never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookAuthHeader {
    timestamp: u32,
    hash: String,
}

impl WebhookAuthHeader {
    /// Parse a header pair received over HTTP.
    ///
    /// The hash is accepted in either case and stored lowercase.
    ///
    /// # Errors
    /// Returns `Error::InvalidHeader` if the timestamp is not a decimal `u32`
    /// or the hash is not 64 hex characters.
    pub fn from_parts(timestamp: &str, hash: &str) -> Result<Self> {
        let timestamp = timestamp.trim().parse::<u32>().map_err(|_| Error::InvalidHeader {
            message: format!("{HEADER_TIMESTAMP} is not a Unix timestamp: '{timestamp}'"),
        })?;

        let hash = hash.trim();
        if hash.len() != HASH_HEX_LENGTH || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidHeader {
                message: format!("{HEADER_HASH} must be {HASH_HEX_LENGTH} hex characters"),
            });
        }

        Ok(WebhookAuthHeader {
            timestamp,
            hash: hash.to_ascii_lowercase(),
        })
    }

    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Timestamp as sent on the wire.
    pub fn timestamp_string(&self) -> String {
        self.timestamp.to_string()
    }

    /// Lowercase hex hash.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Header name/value pairs ready to attach to a request.
    pub fn to_headers(&self) -> [(&'static str, String); 2] {
        [
            (HEADER_TIMESTAMP, self.timestamp_string()),
            (HEADER_HASH, self.hash.clone()),
        ]
    }
}

/// `SHA256(input ‖ timestamp (8, BE) ‖ key)`.
#[must_use]
pub fn compute_hash(key: &SigningKey, input: &[u8], timestamp: u32) -> [u8; DIGEST_LENGTH] {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hasher.update(timestamp_field(timestamp));
    hasher.update(key.as_bytes());
    hasher.finalize().into()
}

/// Generates and verifies webhook authentication headers.
#[derive(Debug, Clone, Default)]
pub struct WebhookAuthenticator<C = SystemClock> {
    clock: C,
}

impl WebhookAuthenticator<SystemClock> {
    /// Create an authenticator that reads the system wall clock.
    pub fn new() -> Self {
        Self { clock: SystemClock }
    }
}

impl<C: Clock> WebhookAuthenticator<C> {
    /// Create an authenticator with an injected clock.
    pub fn with_clock(clock: C) -> Self {
        Self { clock }
    }

    /// Compute the header pair for `input` at the current time.
    pub fn header(&self, key: &SigningKey, input: impl AsRef<[u8]>) -> WebhookAuthHeader {
        let timestamp = self.clock.unix_seconds();
        let input = input.as_ref();
        let hash = hex::encode(compute_hash(key, input, timestamp));

        trace!(timestamp, input_len = input.len(), "Generated webhook auth header");

        WebhookAuthHeader { timestamp, hash }
    }

    /// Compute the header pair from a base64 secret.
    ///
    /// # Errors
    /// Returns `Error::InvalidSecret` if `secret` does not decode to at least
    /// 32 bytes.
    pub fn header_str(&self, secret: &str, input: impl AsRef<[u8]>) -> Result<WebhookAuthHeader> {
        let key = SigningKey::from_base64(secret)?;
        Ok(self.header(&key, input))
    }

    /// Check an inbound header pair against `input`.
    ///
    /// The timestamp must be within `tolerance` seconds of the local clock in
    /// either direction. The hash comparison is constant-time.
    ///
    /// # Errors
    /// - `Error::StaleTimestamp` if the timestamp is outside the window
    /// - `Error::SignatureMismatch` if the hash does not match
    pub fn verify(
        &self,
        key: &SigningKey,
        input: impl AsRef<[u8]>,
        header: &WebhookAuthHeader,
        tolerance: u32,
    ) -> Result<()> {
        let now = self.clock.unix_seconds();
        if now.abs_diff(header.timestamp) > tolerance {
            debug!(
                timestamp = header.timestamp,
                now, tolerance, "Rejected webhook header outside time window"
            );
            return Err(Error::StaleTimestamp {
                timestamp: header.timestamp,
                now,
                tolerance,
            });
        }

        let mut received = [0u8; DIGEST_LENGTH];
        hex::decode_to_slice(&header.hash, &mut received).map_err(|_| Error::SignatureMismatch)?;

        let expected = compute_hash(key, input.as_ref(), header.timestamp);
        if bool::from(expected.ct_eq(&received)) {
            Ok(())
        } else {
            Err(Error::SignatureMismatch)
        }
    }
}

/// Generate a header pair from a base64 secret using the system clock.
///
/// # Errors
/// Returns `Error::InvalidSecret` if `secret` does not decode to at least
/// 32 bytes.
pub fn generate_webhook_header(secret: &str, input: impl AsRef<[u8]>) -> Result<WebhookAuthHeader> {
    WebhookAuthenticator::new().header_str(secret, input)
}
