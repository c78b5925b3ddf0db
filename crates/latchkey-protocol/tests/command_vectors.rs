//! Byte-layout tests for signed commands and webhook headers.
//!
//! These pin the exact bytes exchanged with the bridge firmware using a
//! fixed clock, and check the structural differences between NORMAL and
//! SPECIAL frames.

mod common;

use common::{FIXED_TS, ZERO_SECRET, secret_of_len, sequential_key, unwrap_command};
use hmac::{Hmac, Mac};
use latchkey_core::{
    Action, CommandType, Error, FixedClock, LockAction, LockId, SigningKey, WebhookId,
    constants::{DIGEST_LENGTH, NORMAL_FRAME_LENGTH, SPECIAL_FRAME_LENGTH},
};
use latchkey_protocol::{CommandCodec, CommandFrame, WebhookAuthenticator, WebhookInput};
use rstest::rstest;
use sha2::{Digest, Sha256};

#[rstest]
#[case("open", NORMAL_FRAME_LENGTH)]
#[case("day_lock", NORMAL_FRAME_LENGTH)]
#[case("lock", NORMAL_FRAME_LENGTH)]
#[case("open_electronic_door", SPECIAL_FRAME_LENGTH)]
fn test_encoded_frame_length(#[case] action: &str, #[case] expected: usize) {
    let codec = CommandCodec::with_clock(FixedClock(FIXED_TS));
    let signed = codec.encode_str(action, 2, ZERO_SECRET).unwrap();

    assert_eq!(unwrap_command(&signed).len(), expected);
}

#[test]
fn test_golden_hmac_for_lock_command() {
    let codec = CommandCodec::with_clock(FixedClock(FIXED_TS));
    let signed = codec.encode_str("lock", 2, ZERO_SECRET).unwrap();
    let bytes = unwrap_command(&signed);

    // proto=2, type=7, ts=1700000000 (BE, 8 bytes), lock=2, device=1, action=3
    let payload: [u8; 13] = [
        0x02, 0x07, 0x00, 0x00, 0x00, 0x00, 0x65, 0x53, 0xF1, 0x00, 0x02, 0x01, 0x03,
    ];
    let mut mac = Hmac::<Sha256>::new_from_slice(&[0u8; 32]).unwrap();
    mac.update(&payload);
    let expected = mac.finalize().into_bytes();

    assert_eq!(&bytes[18..18 + DIGEST_LENGTH], expected.as_slice());
    assert_eq!(
        hex::encode(&bytes[18..50]),
        "14bc1c4b17e12cb1984aef0724e575218558be537e8240fb65bd36a558f4abca"
    );
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(31)]
fn test_short_secret_rejected(#[case] len: usize) {
    let codec = CommandCodec::with_clock(FixedClock(FIXED_TS));
    let result = codec.encode_str("open", 1, &secret_of_len(len, 0x5A));
    assert!(matches!(result, Err(Error::InvalidSecret { .. })));
}

#[rstest]
#[case(32)]
#[case(33)]
#[case(64)]
fn test_long_enough_secret_accepted(#[case] len: usize) {
    let codec = CommandCodec::with_clock(FixedClock(FIXED_TS));
    assert!(codec.encode_str("open", 1, &secret_of_len(len, 0x5A)).is_ok());
}

#[test]
fn test_bytes_beyond_32_are_ignored() {
    let codec = CommandCodec::with_clock(FixedClock(FIXED_TS));
    let short = codec.encode_str("open", 1, &secret_of_len(32, 0x5A)).unwrap();
    let long = codec.encode_str("open", 1, &secret_of_len(40, 0x5A)).unwrap();
    assert_eq!(short, long);
}

#[test]
fn test_time_sensitivity() {
    let key = SigningKey::from_base64(ZERO_SECRET).unwrap();
    let first = CommandCodec::with_clock(FixedClock(FIXED_TS))
        .encode(LockAction::Open, LockId::new(5), &key)
        .unwrap();
    let second = CommandCodec::with_clock(FixedClock(FIXED_TS + 1))
        .encode(LockAction::Open, LockId::new(5), &key)
        .unwrap();

    let a = unwrap_command(&first);
    let b = unwrap_command(&second);

    assert_ne!(a, b);
    assert_eq!(a.len(), b.len());
    // message id, proto, type
    assert_eq!(a[..10], b[..10]);
    // lock, device, action
    assert_eq!(a[50..], b[50..]);
    // timestamp and digest both moved
    assert_ne!(a[10..18], b[10..18]);
    assert_ne!(a[18..50], b[18..50]);
}

#[test]
fn test_special_frame_structurally_distinct() {
    let key = SigningKey::from_base64(ZERO_SECRET).unwrap();
    let codec = CommandCodec::with_clock(FixedClock(FIXED_TS));

    let special = codec
        .frame(LockAction::OpenElectronicDoor, LockId::new(2), &key)
        .unwrap();
    let normal = codec.frame(LockAction::Open, LockId::new(2), &key).unwrap();

    assert_eq!(special.command_type(), CommandType::Special);
    assert_eq!(special.action(), Action::Open);
    assert!(special.len() < DIGEST_LENGTH);
    assert!(special.digest().is_none());

    assert_eq!(normal.command_type(), CommandType::Normal);
    assert_eq!(normal.len() - special.len(), NORMAL_FRAME_LENGTH - SPECIAL_FRAME_LENGTH);
}

#[test]
fn test_every_action_decodes_back() {
    let key = sequential_key();
    let codec = CommandCodec::with_clock(FixedClock(FIXED_TS));

    for action in LockAction::ALL {
        let signed = codec.encode(action, LockId::new(200), &key).unwrap();
        let frame = CommandFrame::decode(&signed).unwrap();
        let (command_type, code) = action.command();

        assert_eq!(frame.command_type(), command_type);
        assert_eq!(frame.action(), code);
        assert_eq!(frame.verify(&key).unwrap(), command_type.is_signed());
    }
}

#[test]
fn test_percent_encoding_has_no_reserved_characters() {
    let key = sequential_key();

    for ts in [FIXED_TS, FIXED_TS + 17, u32::MAX] {
        let signed = CommandCodec::with_clock(FixedClock(ts))
            .encode(LockAction::DayLock, LockId::new(255), &key)
            .unwrap();
        assert!(!signed.contains(['+', '/', '=']));
    }
}

#[test]
fn test_webhook_header_matches_independent_hash() {
    let key = SigningKey::from_base64(ZERO_SECRET).unwrap();
    let header = WebhookAuthenticator::with_clock(FixedClock(FIXED_TS)).header(&key, WebhookInput::list());

    let mut hasher = Sha256::new();
    hasher.update(b"");
    hasher.update(u64::from(FIXED_TS).to_be_bytes());
    hasher.update([0u8; 32]);
    let expected = hex::encode(hasher.finalize());

    assert_eq!(header.hash(), expected);
    assert_eq!(header.timestamp_string(), FIXED_TS.to_string());
}

#[test]
fn test_webhook_header_avalanche() {
    let auth = WebhookAuthenticator::with_clock(FixedClock(FIXED_TS));
    let key = sequential_key();
    let base = auth.header(&key, WebhookInput::delete(WebhookId::new(1)));

    // One input byte
    let other_input = auth.header(&key, WebhookInput::delete(WebhookId::new(2)));
    assert_ne!(base.hash(), other_input.hash());

    // One key byte
    let mut key_bytes = *key.as_bytes();
    key_bytes[31] ^= 0x01;
    let other_key = auth.header(&SigningKey::from_bytes(key_bytes), WebhookInput::delete(WebhookId::new(1)));
    assert_ne!(base.hash(), other_key.hash());

    // One second
    let later = WebhookAuthenticator::with_clock(FixedClock(FIXED_TS + 1))
        .header(&key, WebhookInput::delete(WebhookId::new(1)));
    assert_ne!(base.hash(), later.hash());
}

#[test]
fn test_webhook_hash_is_lowercase_hex() {
    let header = WebhookAuthenticator::with_clock(FixedClock(FIXED_TS))
        .header(&sequential_key(), WebhookInput::register("http://10.0.0.2:9005/"));

    assert_eq!(header.hash().len(), 64);
    assert!(header.hash().chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
}
