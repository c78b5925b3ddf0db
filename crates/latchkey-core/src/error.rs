use thiserror::Error;

/// Errors produced while building, decoding or authenticating protocol data.
///
/// None of these messages ever carry key material.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Command errors
    #[error("Invalid action: {action}")]
    InvalidAction { action: String },

    #[error("Invalid secret: {reason}")]
    InvalidSecret { reason: String },

    #[error("Unknown command type: {code}")]
    UnknownCommandType { code: u8 },

    #[error("Invalid frame: {message}")]
    InvalidFrame { message: String },

    // Authentication errors
    #[error("Signature mismatch")]
    SignatureMismatch,

    #[error("Stale timestamp {timestamp} (now {now}, tolerance {tolerance}s)")]
    StaleTimestamp {
        timestamp: u32,
        now: u32,
        tolerance: u32,
    },

    #[error("Invalid header: {message}")]
    InvalidHeader { message: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
