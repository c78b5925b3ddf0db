use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::{BufMut, Bytes, BytesMut};
use hmac::{Hmac, Mac};
use latchkey_core::{
    Action, CommandType, Error, LockAction, LockId, Result, SigningKey,
    clock::timestamp_field,
    constants::*,
};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Offsets into a NORMAL frame.
const OFFSET_PROTOCOL: usize = MESSAGE_ID_LENGTH;
const OFFSET_COMMAND_TYPE: usize = OFFSET_PROTOCOL + 1;
const OFFSET_TIMESTAMP: usize = OFFSET_COMMAND_TYPE + 1;
const OFFSET_DIGEST: usize = OFFSET_TIMESTAMP + TIMESTAMP_LENGTH;
const OFFSET_LOCK_ID: usize = OFFSET_DIGEST + DIGEST_LENGTH;

/// A fully assembled command frame in wire format.
///
/// Frames are immutable and single-use: every build embeds the current
/// timestamp, so a fresh frame is produced for each command.
///
/// # Wire Format
///
/// NORMAL (53 bytes):
///
/// ```text
/// 00 00 00 00 00 00 00 00 | 02 | 07 | 00 00 00 00 TT TT TT TT | <32-byte HMAC> | LL | 01 | AA
///   message id              proto type  timestamp (BE)                             lock dev action
/// ```
///
/// SPECIAL (11 bytes):
///
/// ```text
/// 00 00 00 00 00 00 00 00 | 02 | 59 | AA
/// ```
///
/// # Example
///
/// ```
/// use latchkey_core::{LockAction, LockId, SigningKey};
/// use latchkey_protocol::CommandFrame;
///
/// let key = SigningKey::from_bytes([0u8; 32]);
/// let frame = CommandFrame::build(LockAction::Lock, LockId::new(2), &key, 1_700_000_000).unwrap();
///
/// assert_eq!(frame.len(), 53);
/// assert_eq!(frame.timestamp(), Some(1_700_000_000));
/// assert!(frame.verify(&key).unwrap());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    command_type: CommandType,
    action: Action,
    timestamp: Option<u32>,
    digest: Option<[u8; DIGEST_LENGTH]>,
    lock_id: Option<LockId>,
    data: Bytes,
}

impl CommandFrame {
    /// Build and sign a frame for `action` at the given timestamp.
    ///
    /// SPECIAL actions ignore `lock_id` and `key`: their frames carry
    /// neither an address nor a signature.
    ///
    /// # Errors
    /// Returns `Error::InvalidSecret` if the key cannot initialise the HMAC.
    pub fn build(action: LockAction, lock_id: LockId, key: &SigningKey, timestamp: u32) -> Result<Self> {
        let (command_type, code) = action.command();

        match command_type {
            CommandType::Normal => {
                let payload = signed_payload(command_type, timestamp, lock_id, code);
                let digest = sign(key, &payload)?;

                let mut buf = BytesMut::with_capacity(NORMAL_FRAME_LENGTH);
                buf.put_u64(MESSAGE_ID);
                buf.put_u8(PROTOCOL_VERSION);
                buf.put_u8(command_type.to_u8());
                buf.put_slice(&timestamp_field(timestamp));
                buf.put_slice(&digest);
                buf.put_u8(lock_id.as_u8());
                buf.put_u8(lock_id.device_id());
                buf.put_u8(code.to_u8());

                Ok(CommandFrame {
                    command_type,
                    action: code,
                    timestamp: Some(timestamp),
                    digest: Some(digest),
                    lock_id: Some(lock_id),
                    data: buf.freeze(),
                })
            }
            CommandType::Special => {
                let mut buf = BytesMut::with_capacity(SPECIAL_FRAME_LENGTH);
                buf.put_u64(MESSAGE_ID);
                buf.put_u8(PROTOCOL_VERSION);
                buf.put_u8(command_type.to_u8());
                buf.put_u8(code.to_u8());

                Ok(CommandFrame {
                    command_type,
                    action: code,
                    timestamp: None,
                    digest: None,
                    lock_id: None,
                    data: buf.freeze(),
                })
            }
        }
    }

    /// Parse a frame from its raw bytes.
    ///
    /// # Errors
    /// - `Error::InvalidFrame` if the frame is truncated, has the wrong
    ///   length for its command type, or carries a non-zero message id, a
    ///   non-zero timestamp high word, or an unexpected protocol version or
    ///   device id
    /// - `Error::UnknownCommandType` if the command type byte is unrecognised
    /// - `Error::InvalidAction` if the action byte is unrecognised
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SPECIAL_FRAME_LENGTH {
            return Err(Error::InvalidFrame {
                message: format!(
                    "Frame too short: {} bytes, minimum {SPECIAL_FRAME_LENGTH}",
                    bytes.len()
                ),
            });
        }

        if bytes[..MESSAGE_ID_LENGTH].iter().any(|&b| b != 0) {
            return Err(Error::InvalidFrame {
                message: "Message id must be zero".to_string(),
            });
        }

        if bytes[OFFSET_PROTOCOL] != PROTOCOL_VERSION {
            return Err(Error::InvalidFrame {
                message: format!(
                    "Expected protocol version {PROTOCOL_VERSION}, got {}",
                    bytes[OFFSET_PROTOCOL]
                ),
            });
        }

        let command_type = CommandType::from_u8(bytes[OFFSET_COMMAND_TYPE])?;
        let expected_len = frame_length(command_type);
        if bytes.len() != expected_len {
            return Err(Error::InvalidFrame {
                message: format!(
                    "{command_type} frame must be {expected_len} bytes, got {}",
                    bytes.len()
                ),
            });
        }

        match command_type {
            CommandType::Normal => {
                // Timestamps are 32-bit; the high word of the field is always zero.
                if bytes[OFFSET_TIMESTAMP..OFFSET_TIMESTAMP + 4].iter().any(|&b| b != 0) {
                    return Err(Error::InvalidFrame {
                        message: "Timestamp high word must be zero".to_string(),
                    });
                }

                let mut ts = [0u8; 4];
                ts.copy_from_slice(&bytes[OFFSET_TIMESTAMP + 4..OFFSET_DIGEST]);
                let mut digest = [0u8; DIGEST_LENGTH];
                digest.copy_from_slice(&bytes[OFFSET_DIGEST..OFFSET_LOCK_ID]);

                let device_id = bytes[OFFSET_LOCK_ID + 1];
                if device_id != DEVICE_ID {
                    return Err(Error::InvalidFrame {
                        message: format!("Expected device id {DEVICE_ID}, got {device_id}"),
                    });
                }

                Ok(CommandFrame {
                    command_type,
                    action: Action::from_u8(bytes[OFFSET_LOCK_ID + 2])?,
                    timestamp: Some(u32::from_be_bytes(ts)),
                    digest: Some(digest),
                    lock_id: Some(LockId::new(bytes[OFFSET_LOCK_ID])),
                    data: Bytes::copy_from_slice(bytes),
                })
            }
            CommandType::Special => Ok(CommandFrame {
                command_type,
                action: Action::from_u8(bytes[OFFSET_TIMESTAMP])?,
                timestamp: None,
                digest: None,
                lock_id: None,
                data: Bytes::copy_from_slice(bytes),
            }),
        }
    }

    /// Parse a frame from its URL-safe text encoding.
    ///
    /// Reverses [`CommandFrame::to_url_safe`]: percent-decoding followed by
    /// base64 decoding.
    ///
    /// # Errors
    /// Returns `Error::InvalidFrame` if either decoding step fails, plus any
    /// error from [`CommandFrame::from_bytes`].
    pub fn decode(url_safe: &str) -> Result<Self> {
        let base64 = urlencoding::decode(url_safe).map_err(|e| Error::InvalidFrame {
            message: format!("Invalid percent-encoding: {e}"),
        })?;
        let bytes = STANDARD
            .decode(base64.as_bytes())
            .map_err(|e| Error::InvalidFrame {
                message: format!("Invalid base64: {e}"),
            })?;
        Self::from_bytes(&bytes)
    }

    /// Recompute the HMAC and compare it with the embedded digest.
    ///
    /// Comparison is constant-time.
    ///
    /// # Returns
    /// - `Ok(true)` if the frame is signed and the digest matches
    /// - `Ok(false)` if the frame is SPECIAL (nothing to verify)
    /// - `Err(SignatureMismatch)` if the digest does not match
    pub fn verify(&self, key: &SigningKey) -> Result<bool> {
        let (Some(timestamp), Some(digest), Some(lock_id)) = (self.timestamp, self.digest, self.lock_id) else {
            return Ok(false);
        };

        let payload = signed_payload(self.command_type, timestamp, lock_id, self.action);
        let expected = sign(key, &payload)?;
        if bool::from(expected.ct_eq(&digest)) {
            Ok(true)
        } else {
            Err(Error::SignatureMismatch)
        }
    }

    /// Raw frame bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Frame length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always `false`: a frame has at least its fixed header.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn command_type(&self) -> CommandType {
        self.command_type
    }

    pub fn action(&self) -> Action {
        self.action
    }

    /// Embedded timestamp (NORMAL frames only).
    pub fn timestamp(&self) -> Option<u32> {
        self.timestamp
    }

    /// Embedded HMAC digest (NORMAL frames only).
    pub fn digest(&self) -> Option<&[u8; DIGEST_LENGTH]> {
        self.digest.as_ref()
    }

    /// Addressed lock (NORMAL frames only).
    pub fn lock_id(&self) -> Option<LockId> {
        self.lock_id
    }

    /// Canonical standard-alphabet base64 of the frame.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }

    /// Base64 of the frame, percent-encoded for use as a query parameter value.
    pub fn to_url_safe(&self) -> String {
        urlencoding::encode(&self.to_base64()).into_owned()
    }
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "CommandFrame[type={}, action={}, size={}",
            self.command_type,
            self.action,
            self.data.len()
        )?;
        if let Some(lock_id) = self.lock_id {
            write!(f, ", lock={lock_id}")?;
        }
        if let Some(timestamp) = self.timestamp {
            write!(f, ", ts={timestamp}")?;
        }
        write!(f, "]")
    }
}

/// Expected frame length for a command type.
#[must_use]
pub fn frame_length(command_type: CommandType) -> usize {
    match command_type {
        CommandType::Normal => NORMAL_FRAME_LENGTH,
        CommandType::Special => SPECIAL_FRAME_LENGTH,
    }
}

/// Assemble the sub-message covered by the HMAC.
///
/// `proto | type | timestamp (8, BE) | lock | device | action`
#[must_use]
pub fn signed_payload(
    command_type: CommandType,
    timestamp: u32,
    lock_id: LockId,
    action: Action,
) -> [u8; SIGNED_PAYLOAD_LENGTH] {
    let mut payload = [0u8; SIGNED_PAYLOAD_LENGTH];
    payload[0] = PROTOCOL_VERSION;
    payload[1] = command_type.to_u8();
    payload[2..2 + TIMESTAMP_LENGTH].copy_from_slice(&timestamp_field(timestamp));
    payload[10] = lock_id.as_u8();
    payload[11] = lock_id.device_id();
    payload[12] = action.to_u8();
    payload
}

/// HMAC-SHA256 of `payload` keyed with the 32-byte signing key.
fn sign(key: &SigningKey, payload: &[u8]) -> Result<[u8; DIGEST_LENGTH]> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).map_err(|_| Error::InvalidSecret {
        reason: "key rejected by HMAC".to_string(),
    })?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().into())
}
