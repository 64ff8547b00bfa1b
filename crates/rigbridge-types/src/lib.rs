//! `rigbridge-types` – shared vocabulary of the gateway.
//!
//! Every other crate speaks in these types: actuator channel identifiers,
//! per-channel telemetry and gain records, the decoded [`DeviceFrame`], the
//! parsed [`FrontEndMessage`], and the [`Event`] envelope routed over the
//! internal bus.  The error taxonomy lives in [`error`].

pub mod error;

pub use error::{DecodeError, DispatchError, GatewayError, ParseError, TransportError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Number of actuator channels on the rig.
pub const CHANNEL_COUNT: usize = 4;

/// Largest value representable in a 12-bit protocol field.
pub const FIELD_MAX: u16 = 0x0FFF;

// ────────────────────────────────────────────────────────────────────────────
// Channels
// ────────────────────────────────────────────────────────────────────────────

/// Index of one physical actuator channel, always in `0..CHANNEL_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ActuatorId(u8);

impl ActuatorId {
    /// All channels in ascending order.
    pub const ALL: [ActuatorId; CHANNEL_COUNT] =
        [ActuatorId(0), ActuatorId(1), ActuatorId(2), ActuatorId(3)];

    /// Returns `None` when `index` is not a valid channel.
    pub fn new(index: u8) -> Option<Self> {
        (usize::from(index) < CHANNEL_COUNT).then_some(Self(index))
    }

    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// One-hot 4-bit selector used by the device: channel 0 is `0b1000`,
    /// channel 3 is `0b0001`.
    pub fn one_hot(self) -> u8 {
        0b1000 >> self.0
    }

    /// Inverse of [`one_hot`](Self::one_hot).  Masks with zero or several
    /// bits set select no channel.
    pub fn from_one_hot(mask: u8) -> Option<Self> {
        ActuatorId::ALL.into_iter().find(|id| id.one_hot() == mask)
    }
}

impl TryFrom<u8> for ActuatorId {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        ActuatorId::new(value).ok_or_else(|| format!("channel {value} out of range"))
    }
}

impl From<ActuatorId> for u8 {
    fn from(id: ActuatorId) -> Self {
        id.0
    }
}

impl fmt::Display for ActuatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Per-channel records
// ────────────────────────────────────────────────────────────────────────────

/// Last-known telemetry for one channel.  All fields are 12-bit readings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorState {
    pub position: u16,
    pub drive_voltage: u16,
    pub command_echo: u16,
}

/// PID gains (already scaled to integers by the firmware) and the two
/// stroke capture bounds reported for one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GainSet {
    pub p: u8,
    pub i: u8,
    pub d: u8,
    pub capture_max: u16,
    pub capture_min: u16,
}

// ────────────────────────────────────────────────────────────────────────────
// Device side
// ────────────────────────────────────────────────────────────────────────────

/// A decoded 64-bit word received from the rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceFrame {
    /// Periodic readback, format ids 5–8.
    Telemetry {
        channel: ActuatorId,
        state: ActuatorState,
    },
    /// Answer to a gain request, format ids 11/21/31/41.
    GainReport { channel: ActuatorId, gains: GainSet },
}

impl DeviceFrame {
    pub fn channel(&self) -> ActuatorId {
        match self {
            DeviceFrame::Telemetry { channel, .. } | DeviceFrame::GainReport { channel, .. } => {
                *channel
            }
        }
    }

    /// The 6-bit format id this frame travels under.
    pub fn format_id(&self) -> u8 {
        match self {
            DeviceFrame::Telemetry { channel, .. } => 5 + channel.0,
            DeviceFrame::GainReport { channel, .. } => (channel.0 + 1) * 10 + 1,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Front-end side
// ────────────────────────────────────────────────────────────────────────────

/// Which quantity a `set_target_value` message addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetMode {
    Position,
    Command,
}

impl TargetMode {
    /// 4-bit sub-mode pattern carried in a set-targets word.
    pub fn bits(self) -> u8 {
        match self {
            TargetMode::Position => 0b0000,
            TargetMode::Command => 0b1111,
        }
    }

    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0b0000 => Some(TargetMode::Position),
            0b1111 => Some(TargetMode::Command),
            _ => None,
        }
    }
}

/// Stroke end the firmware should capture as a calibration point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapturePoint {
    Offset,
    Stroke,
}

impl CapturePoint {
    pub fn bits(self) -> u8 {
        match self {
            CapturePoint::Offset => 0b01,
            CapturePoint::Stroke => 0b10,
        }
    }

    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0b01 => Some(CapturePoint::Offset),
            0b10 => Some(CapturePoint::Stroke),
            _ => None,
        }
    }
}

/// Pre-programmed locomotion primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Motion {
    Crawl,
    Trot,
    Pace,
    Bound,
}

impl fmt::Display for Motion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Motion::Crawl => "crawl",
            Motion::Trot => "trot",
            Motion::Pace => "pace",
            Motion::Bound => "bound",
        };
        f.write_str(name)
    }
}

/// One `{num, value}` entry of a `set_target_value` message.
///
/// `value` is the raw front-end number; scaling and masking to the 12-bit
/// field happen when the command is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub channel: ActuatorId,
    pub value: u32,
}

/// A parsed request from the monitoring front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FrontEndMessage {
    SetTargetValue {
        mode: TargetMode,
        targets: Vec<Target>,
    },
    RequestGainValue {
        channel: ActuatorId,
    },
    /// Gains arrive as decimals; they are scaled by ten before packing.
    SetGainValue {
        channel: ActuatorId,
        p: f32,
        i: f32,
        d: f32,
    },
    RequestCapture {
        channel: ActuatorId,
        point: CapturePoint,
    },
    RequestGainSave {
        channel: ActuatorId,
    },
    FixedMotion {
        motion: Motion,
    },
}

impl FrontEndMessage {
    /// Wire name of the message `type`.
    pub fn kind(&self) -> &'static str {
        match self {
            FrontEndMessage::SetTargetValue { .. } => "set_target_value",
            FrontEndMessage::RequestGainValue { .. } => "request_gain_value",
            FrontEndMessage::SetGainValue { .. } => "set_gain_value",
            FrontEndMessage::RequestCapture { .. } => "request_capture",
            FrontEndMessage::RequestGainSave { .. } => "request_gain_save",
            FrontEndMessage::FixedMotion { .. } => "fixed_motion",
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Bus envelope
// ────────────────────────────────────────────────────────────────────────────

/// Unified event wrapper for the internal event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"rigbridge::serial_inbound"`
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp `payload` with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the internal event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// A frame decoded from the device link.
    Device(DeviceFrame),
    /// A link stopped producing traffic within its deadline.
    LinkFault { component: String, message: String },
}
