//! Wall-clock abstraction.
//!
//! Both codecs embed the current time in what they produce, so the time
//! source is injected. Production code uses [`SystemClock`]; tests pin time
//! with [`FixedClock`].

use chrono::Utc;

/// Source of Unix timestamps in whole seconds.
///
/// Timestamps are 32-bit: the protocol only ever populates the low word of
/// its 8-byte timestamp fields.
pub trait Clock: Send + Sync {
    /// Current Unix time in seconds.
    fn unix_seconds(&self) -> u32;
}

/// Clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_seconds(&self) -> u32 {
        // Low word only, matching the firmware's 32-bit field.
        Utc::now().timestamp() as u32
    }
}

/// Clock that always reports the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub u32);

impl Clock for FixedClock {
    fn unix_seconds(&self) -> u32 {
        self.0
    }
}

/// Encode a timestamp as the protocol's 8-byte big-endian field.
///
/// The high word is always zero.
///
/// # Examples
///
/// ```
/// use latchkey_core::clock::timestamp_field;
///
/// assert_eq!(
///     timestamp_field(1_700_000_000),
///     [0x00, 0x00, 0x00, 0x00, 0x65, 0x53, 0xF1, 0x00]
/// );
/// ```
#[inline]
#[must_use]
pub fn timestamp_field(seconds: u32) -> [u8; 8] {
    u64::from(seconds).to_be_bytes()
}
