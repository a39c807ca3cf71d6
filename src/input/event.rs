//! Raw input-event record decoding
//!
//! Input character devices emit fixed 24-byte records: 8 bytes of timestamp
//! seconds, 8 bytes of timestamp microseconds, a 2-byte event type, a 2-byte
//! event code, and a signed 32-bit value, all little-endian. Only two
//! type/code families matter here: relative motion for the pointer reader
//! and key transitions for the keyboard reader.

use crate::{InjectorError, Result};

/// Size of one on-the-wire input event record.
pub const EVENT_SIZE: usize = 24;

/// Key event (press/release/autorepeat).
pub const EV_KEY: u16 = 0x01;
/// Relative motion event.
pub const EV_REL: u16 = 0x02;

/// Horizontal relative motion code.
pub const REL_X: u16 = 0x00;
/// Vertical relative motion code.
pub const REL_Y: u16 = 0x01;

/// Key event value for a press transition (release is 0, autorepeat 2).
pub const KEY_PRESS: i32 = 1;

/// One decoded input event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub time_sec: u64,
    pub time_usec: u64,
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

impl RawEvent {
    /// Decode one fixed-size record.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < EVENT_SIZE {
            return Err(InjectorError::parse_error(
                "input event record",
                format!("expected {} bytes, got {}", EVENT_SIZE, buf.len()),
            ));
        }

        Ok(Self {
            time_sec: parse_u64_le(buf, 0),
            time_usec: parse_u64_le(buf, 8),
            kind: parse_u16_le(buf, 16),
            code: parse_u16_le(buf, 18),
            value: parse_i32_le(buf, 20),
        })
    }

    /// Relative motion delta along one axis, if this is a motion event.
    pub fn relative_motion(&self) -> Option<(u16, i32)> {
        if self.kind == EV_REL && (self.code == REL_X || self.code == REL_Y) {
            Some((self.code, self.value))
        } else {
            None
        }
    }

    /// Keycode of a press transition, if this is one. Releases and
    /// autorepeats are not presses.
    pub fn key_press(&self) -> Option<u16> {
        if self.kind == EV_KEY && self.value == KEY_PRESS { Some(self.code) } else { None }
    }
}

// Offsets are validated by the length check in `RawEvent::parse`; these
// helpers assume in-bounds slices.
fn parse_u64_le(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

fn parse_u16_le(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn parse_i32_le(buf: &[u8], offset: usize) -> i32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    i32::from_le_bytes(bytes)
}

#[cfg(test)]
pub(crate) fn encode_event(kind: u16, code: u16, value: i32) -> [u8; EVENT_SIZE] {
    let mut buf = [0u8; EVENT_SIZE];
    buf[0..8].copy_from_slice(&1_700_000_000u64.to_le_bytes());
    buf[8..16].copy_from_slice(&123_456u64.to_le_bytes());
    buf[16..18].copy_from_slice(&kind.to_le_bytes());
    buf[18..20].copy_from_slice(&code.to_le_bytes());
    buf[20..24].copy_from_slice(&value.to_le_bytes());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_relative_motion_record() {
        let buf = encode_event(EV_REL, REL_X, -7);
        let event = RawEvent::parse(&buf).unwrap();

        assert_eq!(event.time_sec, 1_700_000_000);
        assert_eq!(event.time_usec, 123_456);
        assert_eq!(event.kind, EV_REL);
        assert_eq!(event.relative_motion(), Some((REL_X, -7)));
        assert_eq!(event.key_press(), None);
    }

    #[test]
    fn decodes_key_press_but_not_release_or_repeat() {
        let press = RawEvent::parse(&encode_event(EV_KEY, 58, 1)).unwrap();
        let release = RawEvent::parse(&encode_event(EV_KEY, 58, 0)).unwrap();
        let repeat = RawEvent::parse(&encode_event(EV_KEY, 58, 2)).unwrap();

        assert_eq!(press.key_press(), Some(58));
        assert_eq!(release.key_press(), None);
        assert_eq!(repeat.key_press(), None);
    }

    #[test]
    fn ignores_unrelated_event_types() {
        // EV_SYN-style marker record
        let event = RawEvent::parse(&encode_event(0x00, 0x00, 0)).unwrap();
        assert_eq!(event.relative_motion(), None);
        assert_eq!(event.key_press(), None);
    }

    #[test]
    fn short_record_is_a_parse_error() {
        let err = RawEvent::parse(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, InjectorError::Parse { .. }));
    }
}
