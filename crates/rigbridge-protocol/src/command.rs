//! Outbound command catalogue.
//!
//! | Command | Format id | Fields after the id |
//! |---|---|---|
//! | [`SetTargets`](DeviceCommand::SetTargets) | 63 | mode:4, ch0:12, ch1:12, ch2:12, ch3:12 |
//! | [`RequestGain`](DeviceCommand::RequestGain) | 1 | channel mask:4 |
//! | [`SaveGain`](DeviceCommand::SaveGain) | 1 | zero:4, channel mask:4 |
//! | [`RequestCapture`](DeviceCommand::RequestCapture) | 50 | channel mask:4, point:2 |
//! | [`SetGain`](DeviceCommand::SetGain) | 10, 20, 30, 40 | p:8, i:8, d:8 |
//!
//! Channel masks are one-hot (`0b1000` selects channel 0).

use rigbridge_types::{ActuatorId, CHANNEL_COUNT, CapturePoint, DecodeError, TargetMode};

use crate::codec::{format_id, pack, unpack};

pub const SET_TARGETS_FORMAT: u8 = 63;
pub const GAIN_QUERY_FORMAT: u8 = 1;
pub const CAPTURE_FORMAT: u8 = 50;

/// Factor applied to decimal gains before they are truncated to integers.
pub const GAIN_SCALE: f32 = 10.0;

const TARGET_LAYOUT: [u32; 5] = [4, 12, 12, 12, 12];
const GAIN_QUERY_LAYOUT: [u32; 2] = [4, 4];
const CAPTURE_LAYOUT: [u32; 2] = [4, 2];
const SET_GAIN_LAYOUT: [u32; 3] = [8, 8, 8];

/// A word the gateway sends to the rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Drive all four channels at once.  Values are masked to 12 bits.
    SetTargets {
        mode: TargetMode,
        values: [u16; CHANNEL_COUNT],
    },
    /// Ask the rig to report the gains of one channel.
    RequestGain { channel: ActuatorId },
    /// Ask the rig to persist the gains of one channel and report them back.
    SaveGain { channel: ActuatorId },
    /// Capture the current stroke position as a calibration point.
    RequestCapture {
        channel: ActuatorId,
        point: CapturePoint,
    },
    /// Overwrite the gains of one channel with pre-scaled integers.
    SetGain {
        channel: ActuatorId,
        p: u8,
        i: u8,
        d: u8,
    },
}

impl DeviceCommand {
    /// All channels driven to zero in command mode.
    pub fn home() -> Self {
        DeviceCommand::SetTargets {
            mode: TargetMode::Command,
            values: [0; CHANNEL_COUNT],
        }
    }

    /// Build a [`SetGain`](DeviceCommand::SetGain) from decimal gains.
    pub fn set_gain(channel: ActuatorId, p: f32, i: f32, d: f32) -> Self {
        DeviceCommand::SetGain {
            channel,
            p: scale_gain(p),
            i: scale_gain(i),
            d: scale_gain(d),
        }
    }

    pub fn format_id(&self) -> u8 {
        match self {
            DeviceCommand::SetTargets { .. } => SET_TARGETS_FORMAT,
            DeviceCommand::RequestGain { .. } | DeviceCommand::SaveGain { .. } => {
                GAIN_QUERY_FORMAT
            }
            DeviceCommand::RequestCapture { .. } => CAPTURE_FORMAT,
            DeviceCommand::SetGain { channel, .. } => set_gain_format(*channel),
        }
    }

    /// Pack the command into its 64-bit word.
    pub fn encode(&self) -> u64 {
        let id = self.format_id();
        match *self {
            DeviceCommand::SetTargets { mode, values } => pack(
                id,
                &[
                    (u64::from(mode.bits()), TARGET_LAYOUT[0]),
                    (u64::from(values[0]), TARGET_LAYOUT[1]),
                    (u64::from(values[1]), TARGET_LAYOUT[2]),
                    (u64::from(values[2]), TARGET_LAYOUT[3]),
                    (u64::from(values[3]), TARGET_LAYOUT[4]),
                ],
            ),
            DeviceCommand::RequestGain { channel } => {
                pack(id, &[(u64::from(channel.one_hot()), GAIN_QUERY_LAYOUT[0])])
            }
            DeviceCommand::SaveGain { channel } => pack(
                id,
                &[
                    (0, GAIN_QUERY_LAYOUT[0]),
                    (u64::from(channel.one_hot()), GAIN_QUERY_LAYOUT[1]),
                ],
            ),
            DeviceCommand::RequestCapture { channel, point } => pack(
                id,
                &[
                    (u64::from(channel.one_hot()), CAPTURE_LAYOUT[0]),
                    (u64::from(point.bits()), CAPTURE_LAYOUT[1]),
                ],
            ),
            DeviceCommand::SetGain { p, i, d, .. } => pack(
                id,
                &[
                    (u64::from(p), SET_GAIN_LAYOUT[0]),
                    (u64::from(i), SET_GAIN_LAYOUT[1]),
                    (u64::from(d), SET_GAIN_LAYOUT[2]),
                ],
            ),
        }
    }

    /// Parse a word the way the rig firmware does.  Used by the simulated rig
    /// and by tests that inspect what the gateway transmitted.
    pub fn decode(word: u64) -> Result<Self, DecodeError> {
        let id = format_id(word);
        match id {
            SET_TARGETS_FORMAT => {
                let ([mode, v0, v1, v2, v3], _) = unpack(word, TARGET_LAYOUT);
                let mode = TargetMode::from_bits(mode as u8).ok_or_else(|| {
                    DecodeError::Malformed(format!("unknown target mode {mode:#06b}"))
                })?;
                Ok(DeviceCommand::SetTargets {
                    mode,
                    values: [v0 as u16, v1 as u16, v2 as u16, v3 as u16],
                })
            }
            GAIN_QUERY_FORMAT => match unpack(word, GAIN_QUERY_LAYOUT).0 {
                [request, 0] => Ok(DeviceCommand::RequestGain {
                    channel: one_hot(request)?,
                }),
                [0, save] => Ok(DeviceCommand::SaveGain {
                    channel: one_hot(save)?,
                }),
                [request, save] => Err(DecodeError::Malformed(format!(
                    "gain query selects request {request:#06b} and save {save:#06b}"
                ))),
            },
            CAPTURE_FORMAT => {
                let ([mask, point], _) = unpack(word, CAPTURE_LAYOUT);
                let point = CapturePoint::from_bits(point as u8).ok_or_else(|| {
                    DecodeError::Malformed(format!("unknown capture point {point:#04b}"))
                })?;
                Ok(DeviceCommand::RequestCapture {
                    channel: one_hot(mask)?,
                    point,
                })
            }
            10 | 20 | 30 | 40 => {
                let ([p, i, d], _) = unpack(word, SET_GAIN_LAYOUT);
                let channel = ActuatorId::new(id / 10 - 1)
                    .ok_or_else(|| DecodeError::Malformed(format!("format id {id}")))?;
                Ok(DeviceCommand::SetGain {
                    channel,
                    p: p as u8,
                    i: i as u8,
                    d: d as u8,
                })
            }
            other => Err(DecodeError::UnknownFormat(other)),
        }
    }
}

fn set_gain_format(channel: ActuatorId) -> u8 {
    (channel.index() as u8 + 1) * 10
}

fn one_hot(mask: u64) -> Result<ActuatorId, DecodeError> {
    ActuatorId::from_one_hot(mask as u8)
        .ok_or_else(|| DecodeError::Malformed(format!("channel mask {mask:#06b} is not one-hot")))
}

/// Scale a decimal gain by [`GAIN_SCALE`], truncate toward zero and keep the
/// low 8 bits.  Negative and non-finite inputs become zero.
pub fn scale_gain(value: f32) -> u8 {
    let scaled = (value * GAIN_SCALE).trunc();
    if !scaled.is_finite() || scaled <= 0.0 {
        return 0;
    }
    (scaled as u64 & 0xFF) as u8
}
