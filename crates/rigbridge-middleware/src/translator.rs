//! Message translator between device frames and front-end JSON.
//!
//! # Outbound (gateway → front end)
//!
//! | Frame | JSON |
//! |---|---|
//! | telemetry | `{"type":"current_sensor_value","sensors":[{"num","position","voltage","command"}]}` |
//! | gain report | `{"type":"response_gain_value","num","gains":{"p","i","d"},"capture":{"max","min"}}` |
//!
//! # Inbound (front end → gateway)
//!
//! `num` is accepted as the string `"0"`..`"3"` the front end sends, or as a
//! bare integer.  Numeric payload values may likewise arrive as numbers or
//! numeric strings.  Unknown `type` strings are rejected.

use rigbridge_types::{
    ActuatorId, CHANNEL_COUNT, CapturePoint, DeviceFrame, FrontEndMessage, Motion, ParseError,
    Target, TargetMode,
};
use serde_json::{Value, json};

/// Render a decoded frame as the JSON message the front end expects.
pub fn to_front_end(frame: &DeviceFrame) -> Value {
    match frame {
        DeviceFrame::Telemetry { channel, state } => json!({
            "type": "current_sensor_value",
            "sensors": [{
                "num": channel.index(),
                "position": state.position,
                "voltage": state.drive_voltage,
                "command": state.command_echo,
            }],
        }),
        DeviceFrame::GainReport { channel, gains } => json!({
            "type": "response_gain_value",
            "num": channel.index(),
            "gains": { "p": gains.p, "i": gains.i, "d": gains.d },
            "capture": { "max": gains.capture_max, "min": gains.capture_min },
        }),
    }
}

/// Parse one UTF-8 JSON datagram.
pub fn parse_datagram(bytes: &[u8]) -> Result<FrontEndMessage, ParseError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    from_front_end(&value)
}

/// Interpret a front-end JSON message.
pub fn from_front_end(value: &Value) -> Result<FrontEndMessage, ParseError> {
    let kind = value
        .get("type")
        .ok_or(ParseError::MissingField("type"))?
        .as_str()
        .ok_or_else(|| invalid("type", "expected a string"))?;

    match kind {
        "set_target_value" => parse_set_target(value),
        "request_gain_value" => Ok(FrontEndMessage::RequestGainValue {
            channel: channel(value)?,
        }),
        "request_gain_save" => Ok(FrontEndMessage::RequestGainSave {
            channel: channel(value)?,
        }),
        "request_capture" => Ok(FrontEndMessage::RequestCapture {
            channel: channel(value)?,
            point: capture_point(value)?,
        }),
        "set_gain_value" => Ok(FrontEndMessage::SetGainValue {
            channel: channel(value)?,
            p: gain(value, "p")?,
            i: gain(value, "i")?,
            d: gain(value, "d")?,
        }),
        "fixed_motion" => Ok(FrontEndMessage::FixedMotion {
            motion: motion(value)?,
        }),
        other => Err(ParseError::UnknownMessageType(other.to_string())),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Field helpers
// ─────────────────────────────────────────────────────────────────────────────

fn invalid(field: &'static str, reason: impl Into<String>) -> ParseError {
    ParseError::InvalidField {
        field,
        reason: reason.into(),
    }
}

fn parse_set_target(value: &Value) -> Result<FrontEndMessage, ParseError> {
    let (mode, field, entries) = match (value.get("position"), value.get("command")) {
        (Some(entries), None) => (TargetMode::Position, "position", entries),
        (None, Some(entries)) => (TargetMode::Command, "command", entries),
        (Some(_), Some(_)) => {
            return Err(invalid(
                "position",
                "`position` and `command` cannot be combined",
            ));
        }
        (None, None) => return Err(ParseError::MissingField("position")),
    };

    let entries = entries
        .as_array()
        .ok_or_else(|| invalid(field, "expected an array of {num, value}"))?;
    if entries.is_empty() {
        return Err(invalid(field, "no targets given"));
    }

    let targets = entries
        .iter()
        .map(|entry| {
            Ok(Target {
                channel: channel(entry)?,
                value: target_value(entry)?,
            })
        })
        .collect::<Result<Vec<_>, ParseError>>()?;

    Ok(FrontEndMessage::SetTargetValue { mode, targets })
}

fn channel(value: &Value) -> Result<ActuatorId, ParseError> {
    let raw = value.get("num").ok_or(ParseError::MissingField("num"))?;
    let index = match raw {
        Value::String(s) => s.trim().parse::<u8>().ok(),
        Value::Number(n) => n.as_u64().and_then(|n| u8::try_from(n).ok()),
        _ => None,
    };
    index
        .and_then(ActuatorId::new)
        .ok_or_else(|| invalid("num", format!("expected a channel below {CHANNEL_COUNT}, got {raw}")))
}

fn number(value: &Value, field: &'static str) -> Result<f64, ParseError> {
    let raw = value.get(field).ok_or(ParseError::MissingField(field))?;
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|n| n.is_finite())
        .ok_or_else(|| invalid(field, format!("expected a number, got {raw}")))
}

fn target_value(entry: &Value) -> Result<u32, ParseError> {
    let value = number(entry, "value")?.trunc();
    if !(0.0..=f64::from(u32::MAX)).contains(&value) {
        return Err(invalid("value", format!("{value} is out of range")));
    }
    Ok(value as u32)
}

fn gain(value: &Value, field: &'static str) -> Result<f32, ParseError> {
    Ok(number(value, field)? as f32)
}

fn capture_point(value: &Value) -> Result<CapturePoint, ParseError> {
    match value.get("capture").and_then(Value::as_str) {
        Some("offset") => Ok(CapturePoint::Offset),
        Some("stroke") => Ok(CapturePoint::Stroke),
        Some(other) => Err(invalid("capture", format!("unknown capture point `{other}`"))),
        None => Err(ParseError::MissingField("capture")),
    }
}

fn motion(value: &Value) -> Result<Motion, ParseError> {
    match value.get("motion").and_then(Value::as_str) {
        Some("crawl") => Ok(Motion::Crawl),
        Some("trot") => Ok(Motion::Trot),
        Some("pace") => Ok(Motion::Pace),
        Some("bound") => Ok(Motion::Bound),
        Some(other) => Err(invalid("motion", format!("unknown motion `{other}`"))),
        None => Err(ParseError::MissingField("motion")),
    }
}
