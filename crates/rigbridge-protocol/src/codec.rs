//! 64-bit device word codec.
//!
//! Every word starts with a 6-bit format id in bits 63..58.  The fields that
//! follow are packed MSB-first with no gaps, and whatever low-order bits are
//! left over are padding that must be zero.
//!
//! | Format ids | Direction | Fields after the id | Padding |
//! |---|---|---|---|
//! | 5, 6, 7, 8 | rig → gateway | position:12, voltage:12, command:12 | 22 bits |
//! | 11, 21, 31, 41 | rig → gateway | p:8, i:8, d:8, capture max:12, capture min:12 | 10 bits |
//!
//! Outbound layouts are listed in [`crate::command`].

use rigbridge_types::{ActuatorId, ActuatorState, DecodeError, DeviceFrame, GainSet};
use tracing::warn;

pub const WORD_BITS: u32 = 64;
pub const FORMAT_BITS: u32 = 6;
const FORMAT_SHIFT: u32 = WORD_BITS - FORMAT_BITS;

const TELEMETRY_LAYOUT: [u32; 3] = [12, 12, 12];
const GAIN_LAYOUT: [u32; 5] = [8, 8, 8, 12, 12];

/// What to do with a frame whose padding bits are not all zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PaddingPolicy {
    /// Log a warning and keep the frame.
    #[default]
    Warn,
    /// Fail with [`DecodeError::Malformed`].
    Reject,
}

/// Mask covering the low `width` bits.
pub fn mask(width: u32) -> u64 {
    if width >= WORD_BITS {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// The 6-bit format id of `word`.
pub fn format_id(word: u64) -> u8 {
    ((word >> FORMAT_SHIFT) & mask(FORMAT_BITS)) as u8
}

/// Pack `format_id` and `(value, width)` pairs into one word.
///
/// Values are silently truncated to their width.  A layout wider than the
/// 58 bits available is cut short, so the result always fits in 64 bits.
pub fn pack(format_id: u8, fields: &[(u64, u32)]) -> u64 {
    let mut word = (u64::from(format_id) & mask(FORMAT_BITS)) << FORMAT_SHIFT;
    let mut shift = FORMAT_SHIFT;
    for &(value, width) in fields {
        let width = width.min(shift);
        shift -= width;
        word |= (value & mask(width)) << shift;
    }
    word
}

/// Split `word` into the fields described by `widths`.
///
/// Returns the field values together with the leftover padding bits.
pub fn unpack<const N: usize>(word: u64, widths: [u32; N]) -> ([u64; N], u64) {
    let mut fields = [0u64; N];
    let mut shift = FORMAT_SHIFT;
    for (slot, width) in fields.iter_mut().zip(widths) {
        let width = width.min(shift);
        shift -= width;
        *slot = (word >> shift) & mask(width);
    }
    (fields, word & mask(shift))
}

/// Decode one inbound word into a typed frame.
pub fn decode(word: u64, padding: PaddingPolicy) -> Result<DeviceFrame, DecodeError> {
    let id = format_id(word);
    match id {
        5..=8 => {
            let ([position, voltage, command], pad) = unpack(word, TELEMETRY_LAYOUT);
            check_padding(id, pad, padding)?;
            Ok(DeviceFrame::Telemetry {
                channel: channel(id, id - 5)?,
                state: ActuatorState {
                    position: position as u16,
                    drive_voltage: voltage as u16,
                    command_echo: command as u16,
                },
            })
        }
        11 | 21 | 31 | 41 => {
            let ([p, i, d, max, min], pad) = unpack(word, GAIN_LAYOUT);
            check_padding(id, pad, padding)?;
            Ok(DeviceFrame::GainReport {
                channel: channel(id, (id - 1) / 10 - 1)?,
                gains: GainSet {
                    p: p as u8,
                    i: i as u8,
                    d: d as u8,
                    capture_max: max as u16,
                    capture_min: min as u16,
                },
            })
        }
        other => Err(DecodeError::UnknownFormat(other)),
    }
}

/// Encode a frame the way the rig would send it.
pub fn encode_frame(frame: &DeviceFrame) -> u64 {
    let id = frame.format_id();
    match frame {
        DeviceFrame::Telemetry { state, .. } => pack(
            id,
            &[
                (u64::from(state.position), TELEMETRY_LAYOUT[0]),
                (u64::from(state.drive_voltage), TELEMETRY_LAYOUT[1]),
                (u64::from(state.command_echo), TELEMETRY_LAYOUT[2]),
            ],
        ),
        DeviceFrame::GainReport { gains, .. } => pack(
            id,
            &[
                (u64::from(gains.p), GAIN_LAYOUT[0]),
                (u64::from(gains.i), GAIN_LAYOUT[1]),
                (u64::from(gains.d), GAIN_LAYOUT[2]),
                (u64::from(gains.capture_max), GAIN_LAYOUT[3]),
                (u64::from(gains.capture_min), GAIN_LAYOUT[4]),
            ],
        ),
    }
}

fn channel(format_id: u8, index: u8) -> Result<ActuatorId, DecodeError> {
    ActuatorId::new(index).ok_or_else(|| {
        DecodeError::Malformed(format!("format id {format_id} maps to channel {index}"))
    })
}

fn check_padding(format_id: u8, padding: u64, policy: PaddingPolicy) -> Result<(), DecodeError> {
    if padding == 0 {
        return Ok(());
    }
    match policy {
        PaddingPolicy::Warn => {
            warn!(format_id, padding, "non-zero padding bits in device frame");
            Ok(())
        }
        PaddingPolicy::Reject => Err(DecodeError::Malformed(format!(
            "non-zero padding {padding:#x} in format {format_id}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(index: u8) -> ActuatorId {
        ActuatorId::new(index).unwrap()
    }

    #[test]
    fn telemetry_layout_matches_firmware_offsets() {
        let word = (5u64 << 58) | (100u64 << 46) | (200u64 << 34) | (300u64 << 22);
        let frame = decode(word, PaddingPolicy::Reject).unwrap();
        assert_eq!(
            frame,
            DeviceFrame::Telemetry {
                channel: ch(0),
                state: ActuatorState {
                    position: 100,
                    drive_voltage: 200,
                    command_echo: 300,
                },
            }
        );
        assert_eq!(encode_frame(&frame), word);
    }

    #[test]
    fn gain_layout_matches_firmware_offsets() {
        let word = (41u64 << 58)
            | (12u64 << 50)
            | (3u64 << 42)
            | (250u64 << 34)
            | (4000u64 << 22)
            | (17u64 << 10);
        let frame = decode(word, PaddingPolicy::Reject).unwrap();
        assert_eq!(
            frame,
            DeviceFrame::GainReport {
                channel: ch(3),
                gains: GainSet {
                    p: 12,
                    i: 3,
                    d: 250,
                    capture_max: 4000,
                    capture_min: 17,
                },
            }
        );
    }

    #[test]
    fn every_channel_survives_a_roundtrip() {
        for id in ActuatorId::ALL {
            let salt = id.index() as u16;
            let telemetry = DeviceFrame::Telemetry {
                channel: id,
                state: ActuatorState {
                    position: 4095 - salt,
                    drive_voltage: 1 + salt,
                    command_echo: 2048 + salt,
                },
            };
            let report = DeviceFrame::GainReport {
                channel: id,
                gains: GainSet {
                    p: 255 - salt as u8,
                    i: salt as u8,
                    d: 128,
                    capture_max: 4095,
                    capture_min: salt,
                },
            };
            for frame in [telemetry, report] {
                let word = encode_frame(&frame);
                assert_eq!(decode(word, PaddingPolicy::Reject).unwrap(), frame);
            }
        }
    }

    #[test]
    fn gain_format_ids_map_to_zero_based_channels() {
        for (format, expected) in [(11u64, 0), (21, 1), (31, 2), (41, 3)] {
            let frame = decode(format << 58, PaddingPolicy::Reject).unwrap();
            assert_eq!(frame.channel(), ch(expected));
        }
    }

    #[test]
    fn pack_truncates_instead_of_overflowing() {
        let word = pack(63, &[(u64::MAX, 4), (0xFFFF, 12), (0, 12)]);
        assert_eq!(format_id(word), 63);
        let ([mode, first, second], pad) = unpack(word, [4, 12, 12]);
        assert_eq!(mode, 0xF);
        assert_eq!(first, 0xFFF);
        assert_eq!(second, 0);
        assert_eq!(pad, 0);

        // A layout wider than the word is cut at bit 0.
        let wide = pack(1, &[(u64::MAX, 40), (u64::MAX, 40)]);
        assert_eq!(format_id(wide), 1);
        assert_eq!(wide & mask(58), mask(58));
    }

    #[test]
    fn unknown_format_is_reported_not_fatal() {
        assert_eq!(decode(0, PaddingPolicy::Warn), Err(DecodeError::UnknownFormat(0)));
        assert_eq!(
            decode(12u64 << 58, PaddingPolicy::Warn),
            Err(DecodeError::UnknownFormat(12))
        );
    }

    #[test]
    fn padding_policy_controls_dirty_frames() {
        let dirty = (6u64 << 58) | (7u64 << 46) | 0b1_0000;
        let frame = decode(dirty, PaddingPolicy::Warn).unwrap();
        assert_eq!(frame.channel(), ch(1));
        assert!(matches!(
            decode(dirty, PaddingPolicy::Reject),
            Err(DecodeError::Malformed(_))
        ));
    }
}
