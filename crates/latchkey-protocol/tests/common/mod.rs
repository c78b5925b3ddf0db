//! Shared helpers for protocol integration tests.

#![allow(dead_code)]

use base64::{Engine, engine::general_purpose::STANDARD};
use latchkey_core::SigningKey;

/// 32 zero bytes, base64 encoded.
pub const ZERO_SECRET: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

/// 2023-11-14T22:13:20Z
pub const FIXED_TS: u32 = 1_700_000_000;

/// Base64 secret decoding to `len` bytes of `fill`.
pub fn secret_of_len(len: usize, fill: u8) -> String {
    STANDARD.encode(vec![fill; len])
}

/// Key with bytes 0, 1, 2, ..., 31.
pub fn sequential_key() -> SigningKey {
    let mut bytes = [0u8; 32];
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = i as u8;
    }
    SigningKey::from_bytes(bytes)
}

/// Percent-decode then base64-decode a signed command.
pub fn unwrap_command(url_safe: &str) -> Vec<u8> {
    let b64 = urlencoding::decode(url_safe).expect("valid percent-encoding");
    STANDARD.decode(b64.as_bytes()).expect("valid base64")
}
