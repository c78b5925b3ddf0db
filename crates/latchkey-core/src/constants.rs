//! Core constants for the bridge command protocol.
//!
//! This module defines the protocol-level constants shared by the command
//! codec, the webhook authenticator and the HTTP collaborators. Every value
//! here is part of the wire contract with the bridge firmware.
//!
//! # Command Frame Layout
//!
//! A NORMAL (signed) command frame is laid out as:
//!
//! ```text
//! | msg id (8) | proto (1) | type (1) | timestamp (8) | hmac (32) | lock (1) | device (1) | action (1) |
//! ```
//!
//! A SPECIAL (unsigned) command frame carries only:
//!
//! ```text
//! | msg id (8) | proto (1) | type (1) | action (1) |
//! ```
//!
//! # Usage
//!
//! ```
//! use latchkey_core::constants::*;
//!
//! assert_eq!(NORMAL_FRAME_LENGTH, 53);
//! assert_eq!(SPECIAL_FRAME_LENGTH, 11);
//! assert_eq!(DEFAULT_LISTEN_PORT, 9005);
//! ```
//!
//! # Protocol Compliance
//!
//! Modifying these values breaks compatibility with deployed bridges.

// ============================================================================
// Frame Header
// ============================================================================

/// Message identifier written into every frame.
///
/// The bridge ignores this field; it is always zero.
pub const MESSAGE_ID: u64 = 0;

/// Protocol version byte embedded in every frame and signed payload.
pub const PROTOCOL_VERSION: u8 = 2;

/// Device identifier byte for the bolt actuator.
///
/// The bridge only exposes a single actuator per lock, so this is constant.
pub const DEVICE_ID: u8 = 1;

// ============================================================================
// Field Sizes
// ============================================================================

/// Length of the message-id field (bytes).
pub const MESSAGE_ID_LENGTH: usize = 8;

/// Length of the timestamp field (bytes).
///
/// The timestamp is a 32-bit value stored in the low word of this
/// zero-initialized big-endian field.
pub const TIMESTAMP_LENGTH: usize = 8;

/// Length of key material taken from a decoded secret (bytes).
///
/// Decoded secrets shorter than this are rejected. Anything beyond it is
/// discarded.
pub const KEY_LENGTH: usize = 32;

/// Length of an HMAC-SHA256 / SHA-256 digest (bytes).
pub const DIGEST_LENGTH: usize = 32;

/// Length of the HMAC-signed sub-message (bytes).
///
/// `proto (1) | type (1) | timestamp (8) | lock (1) | device (1) | action (1)`
pub const SIGNED_PAYLOAD_LENGTH: usize = 1 + 1 + TIMESTAMP_LENGTH + 1 + 1 + 1;

/// Total length of a NORMAL command frame (bytes).
///
/// # Value: 53 bytes (8 + 1 + 1 + 8 + 32 + 1 + 1 + 1)
pub const NORMAL_FRAME_LENGTH: usize =
    MESSAGE_ID_LENGTH + 1 + 1 + TIMESTAMP_LENGTH + DIGEST_LENGTH + 1 + 1 + 1;

/// Total length of a SPECIAL command frame (bytes).
///
/// # Value: 11 bytes (8 + 1 + 1 + 1)
pub const SPECIAL_FRAME_LENGTH: usize = MESSAGE_ID_LENGTH + 1 + 1 + 1;

/// Length of a hex-encoded webhook hash (characters).
pub const HASH_HEX_LENGTH: usize = DIGEST_LENGTH * 2;

// ============================================================================
// Webhooks
// ============================================================================

/// Bit flag subscribing a webhook to every event class.
///
/// The nine trigger bits (state changed open/latch/night lock/unknown,
/// go-to open/latch/night lock, battery, online status) all set. Appended
/// as a 4-byte big-endian value when authenticating a registration.
///
/// # Value: 511 (0x1FF)
pub const WEBHOOK_ALL_EVENTS_FLAG: u32 = 0x1FF;

/// HTTP header carrying the decimal Unix timestamp.
pub const HEADER_TIMESTAMP: &str = "TIMESTAMP";

/// HTTP header carrying the lowercase hex SHA-256 hash.
pub const HEADER_HASH: &str = "HASH";

/// Default clock skew accepted when verifying inbound webhook headers (seconds).
///
/// # Value: 300 seconds (5 minutes)
pub const DEFAULT_WEBHOOK_TOLERANCE_SECS: u32 = 300;

// ============================================================================
// Bridge HTTP Surface
// ============================================================================

/// Default port of the local webhook listener.
pub const DEFAULT_LISTEN_PORT: u16 = 9005;

/// Query parameter that carries the signed command.
pub const COMMAND_QUERY_PARAM: &str = "command_signed_base64";

/// Bridge path accepting signed lock commands.
pub const PATH_TO_LOCK: &str = "/to_lock";

/// Bridge path reporting lock and bridge status.
pub const PATH_STATUS: &str = "/status";

/// Bridge path managing webhook registrations.
pub const PATH_WEBHOOKS: &str = "/webhooks";

/// Default timeout for bridge HTTP requests (milliseconds).
///
/// # Value: 5000ms
pub const DEFAULT_REQUEST_TIMEOUT: u64 = 5000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_lengths() {
        assert_eq!(NORMAL_FRAME_LENGTH, 53);
        assert_eq!(SPECIAL_FRAME_LENGTH, 11);
        assert_eq!(SIGNED_PAYLOAD_LENGTH, 13);
    }

    #[test]
    fn test_all_events_flag_covers_nine_triggers() {
        assert_eq!(WEBHOOK_ALL_EVENTS_FLAG.count_ones(), 9);
    }
}
