use crate::{
    Result,
    constants::{DEVICE_ID, KEY_LENGTH},
    error::Error,
};
use base64::{
    Engine, alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Standard-alphabet base64 that accepts secrets with or without padding,
/// and ignores non-zero trailing bits in the final symbol.
const SECRET_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// High-level lock action requested by a caller.
///
/// This is the closed set of operations the bridge accepts. Each variant maps
/// to exactly one `(CommandType, Action)` pair via [`LockAction::command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockAction {
    Open,
    DayLock,
    Lock,
    OpenElectronicDoor,
}

impl LockAction {
    /// Every recognized action, in wire-code order.
    pub const ALL: [LockAction; 4] = [
        LockAction::Open,
        LockAction::DayLock,
        LockAction::Lock,
        LockAction::OpenElectronicDoor,
    ];

    /// Command type and action code for this action.
    ///
    /// | Action | Command type | Action code |
    /// |--------|--------------|-------------|
    /// | `open` | NORMAL (7) | OPEN (1) |
    /// | `day_lock` | NORMAL (7) | DAY_LOCK (2) |
    /// | `lock` | NORMAL (7) | LOCK (3) |
    /// | `open_electronic_door` | SPECIAL (89) | OPEN (1) |
    #[must_use]
    pub fn command(self) -> (CommandType, Action) {
        match self {
            LockAction::Open => (CommandType::Normal, Action::Open),
            LockAction::DayLock => (CommandType::Normal, Action::DayLock),
            LockAction::Lock => (CommandType::Normal, Action::Lock),
            LockAction::OpenElectronicDoor => (CommandType::Special, Action::Open),
        }
    }

    /// Wire name of the action.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LockAction::Open => "open",
            LockAction::DayLock => "day_lock",
            LockAction::Lock => "lock",
            LockAction::OpenElectronicDoor => "open_electronic_door",
        }
    }
}

impl fmt::Display for LockAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LockAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "open" => Ok(LockAction::Open),
            "day_lock" => Ok(LockAction::DayLock),
            "lock" => Ok(LockAction::Lock),
            "open_electronic_door" => Ok(LockAction::OpenElectronicDoor),
            _ => Err(Error::InvalidAction {
                action: s.to_string(),
            }),
        }
    }
}

/// Target bolt position encoded in a command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Action {
    Open = 1,
    DayLock = 2,
    Lock = 3,
}

impl Action {
    /// Create an action from its wire code.
    ///
    /// # Errors
    /// Returns `Error::InvalidAction` if the code is not 1, 2 or 3.
    #[inline]
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Action::Open),
            2 => Ok(Action::DayLock),
            3 => Ok(Action::Lock),
            _ => Err(Error::InvalidAction {
                action: format!("code {value}"),
            }),
        }
    }

    /// Wire code of the action.
    #[inline]
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Action::Open => write!(f, "OPEN"),
            Action::DayLock => write!(f, "DAY_LOCK"),
            Action::Lock => write!(f, "LOCK"),
        }
    }
}

/// Command frame flavour.
///
/// NORMAL commands are timestamped, addressed and HMAC-signed. SPECIAL
/// commands carry the action alone with no signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CommandType {
    Normal = 7,
    Special = 89,
}

impl CommandType {
    /// Create a command type from its wire code.
    ///
    /// # Errors
    /// Returns `Error::UnknownCommandType` for any code other than 7 or 89.
    #[inline]
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            7 => Ok(CommandType::Normal),
            89 => Ok(CommandType::Special),
            _ => Err(Error::UnknownCommandType { code: value }),
        }
    }

    /// Wire code of the command type.
    #[inline]
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Returns `true` if frames of this type carry a timestamp and HMAC.
    #[inline]
    #[must_use]
    pub fn is_signed(self) -> bool {
        matches!(self, CommandType::Normal)
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CommandType::Normal => write!(f, "NORMAL"),
            CommandType::Special => write!(f, "SPECIAL"),
        }
    }
}

/// Identifier of the physical bolt addressed by a command.
///
/// Encoded as a single byte, so every `u8` is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockId(u8);

impl LockId {
    #[must_use]
    pub const fn new(id: u8) -> Self {
        LockId(id)
    }

    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    /// Device id that accompanies this lock id on the wire.
    #[must_use]
    pub fn device_id(&self) -> u8 {
        DEVICE_ID
    }
}

impl From<u8> for LockId {
    fn from(id: u8) -> Self {
        LockId(id)
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for LockId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim().parse::<u8>().map(LockId).map_err(|_| {
            Error::Config(format!("Lock ID must be an integer 0-255, got '{s}'"))
        })
    }
}

/// 32 bytes of key material decoded from a base64 secret.
///
/// Used as the HMAC key for command signing and as the hash suffix for
/// webhook authentication.
///
/// # Security
/// `Debug` output is redacted, there is no `Display`, and equality is
/// constant-time.
#[derive(Clone)]
pub struct SigningKey([u8; KEY_LENGTH]);

impl SigningKey {
    /// Decode a base64 secret and keep its first 32 bytes.
    ///
    /// Padding is optional and surrounding whitespace is ignored.
    ///
    /// # Errors
    /// Returns `Error::InvalidSecret` if the text is not base64 or decodes to
    /// fewer than 32 bytes.
    pub fn from_base64(secret: &str) -> Result<Self> {
        let decoded = SECRET_ENGINE
            .decode(secret.trim())
            .map_err(|_| Error::InvalidSecret {
                reason: "secret is not valid base64".to_string(),
            })?;

        if decoded.len() < KEY_LENGTH {
            return Err(Error::InvalidSecret {
                reason: format!(
                    "secret decodes to {} bytes, need at least {KEY_LENGTH}",
                    decoded.len()
                ),
            });
        }

        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(&decoded[..KEY_LENGTH]);
        Ok(SigningKey(key))
    }

    /// Build a key directly from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        SigningKey(bytes)
    }

    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("SigningKey([REDACTED])")
    }
}

impl PartialEq for SigningKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for SigningKey {}

impl std::str::FromStr for SigningKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SigningKey::from_base64(s)
    }
}

/// Identifier of a webhook registered on the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WebhookId(u64);

impl WebhookId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        WebhookId(id)
    }

    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// 8-byte big-endian field used when authenticating a deletion.
    #[must_use]
    pub fn to_field(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl From<u64> for WebhookId {
    fn from(id: u64) -> Self {
        WebhookId(id)
    }
}

impl fmt::Display for WebhookId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for WebhookId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u64>()
            .map(WebhookId)
            .map_err(|_| Error::Config(format!("Webhook ID must be an unsigned integer, got '{s}'")))
    }
}
