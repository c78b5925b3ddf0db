//! Command signing codec.
//!
//! [`CommandCodec`] turns a high-level [`LockAction`] into the URL-safe
//! string the bridge expects in its `command_signed_base64` query parameter.
//!
//! # Pipeline
//!
//! ```text
//! LockAction ──> (CommandType, Action) ──> signed payload ──HMAC-SHA256──> digest
//!                                                                            │
//!              URL-safe string <── percent-encode <── base64 <── CommandFrame┘
//! ```
//!
//! # Usage
//!
//! ```
//! use latchkey_core::{FixedClock, LockAction, LockId, SigningKey};
//! use latchkey_protocol::{CommandCodec, CommandFrame};
//!
//! let key = SigningKey::from_base64("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=").unwrap();
//! let codec = CommandCodec::with_clock(FixedClock(1_700_000_000));
//!
//! let signed = codec.encode(LockAction::Lock, LockId::new(2), &key).unwrap();
//! let frame = CommandFrame::decode(&signed).unwrap();
//! assert_eq!(frame.len(), 53);
//! ```
//!
//! # Statelessness
//!
//! The codec holds nothing but its clock. It can be shared freely across
//! threads and tasks; each call builds a fresh frame.

use latchkey_core::{Clock, LockAction, LockId, Result, SigningKey, SystemClock};
use tracing::trace;

use crate::CommandFrame;

/// Builds, signs and encodes lock commands.
#[derive(Debug, Clone, Default)]
pub struct CommandCodec<C = SystemClock> {
    clock: C,
}

impl CommandCodec<SystemClock> {
    /// Create a codec that reads the system wall clock.
    pub fn new() -> Self {
        Self { clock: SystemClock }
    }
}

impl<C: Clock> CommandCodec<C> {
    /// Create a codec with an injected clock.
    pub fn with_clock(clock: C) -> Self {
        Self { clock }
    }

    /// Build the signed frame for `action` at the current time.
    ///
    /// # Errors
    /// Returns `Error::InvalidSecret` if the key cannot initialise the HMAC.
    pub fn frame(&self, action: LockAction, lock_id: LockId, key: &SigningKey) -> Result<CommandFrame> {
        let timestamp = self.clock.unix_seconds();
        let frame = CommandFrame::build(action, lock_id, key, timestamp)?;

        trace!(
            action = %action,
            lock_id = %lock_id,
            command_type = %frame.command_type(),
            size = frame.len(),
            "Built command frame"
        );

        Ok(frame)
    }

    /// Build, sign and encode `action` as a URL-safe string.
    ///
    /// # Errors
    /// Returns `Error::InvalidSecret` if the key cannot initialise the HMAC.
    pub fn encode(&self, action: LockAction, lock_id: LockId, key: &SigningKey) -> Result<String> {
        Ok(self.frame(action, lock_id, key)?.to_url_safe())
    }

    /// Encode from untyped inputs: action name, raw lock id and base64 secret.
    ///
    /// # Errors
    /// - `Error::InvalidAction` if `action` is not one of `open`, `day_lock`,
    ///   `lock` or `open_electronic_door`
    /// - `Error::InvalidSecret` if `secret` does not decode to at least 32 bytes
    pub fn encode_str(&self, action: &str, lock_id: u8, secret: &str) -> Result<String> {
        let action: LockAction = action.parse()?;
        let key = SigningKey::from_base64(secret)?;
        self.encode(action, LockId::new(lock_id), &key)
    }
}

/// Encode a command using the system clock.
///
/// Shorthand for `CommandCodec::new().encode_str(action, lock_id, secret)`.
///
/// # Errors
/// See [`CommandCodec::encode_str`].
pub fn create_command(action: &str, lock_id: u8, secret: &str) -> Result<String> {
    CommandCodec::new().encode_str(action, lock_id, secret)
}
