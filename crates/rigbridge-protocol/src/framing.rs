//! Base64 text-line framing of device words.
//!
//! The two directions do not use the same byte order:
//!
//! * **rig → gateway** ("report" lines) carry the little-endian bytes of the
//!   word.  The firmware sends all eight bytes.
//! * **gateway → rig** ("command" lines) carry the big-endian bytes of the
//!   word with leading zero bytes dropped, followed by `\n`.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rigbridge_types::DecodeError;

const WORD_BYTES: usize = 8;

/// Frame a gateway → rig word as one newline-terminated line.
pub fn encode_command_line(word: u64) -> String {
    let bytes = word.to_be_bytes();
    let skip = (word.leading_zeros() / 8) as usize;
    let mut line = STANDARD.encode(&bytes[skip.min(WORD_BYTES)..]);
    line.push('\n');
    line
}

/// Parse a gateway → rig line back into its word.
pub fn decode_command_line(line: &str) -> Result<u64, DecodeError> {
    let bytes = decode_base64(line)?;
    let mut buf = [0u8; WORD_BYTES];
    buf[WORD_BYTES - bytes.len()..].copy_from_slice(&bytes);
    Ok(u64::from_be_bytes(buf))
}

/// Frame a rig → gateway word.  Only the simulated rig needs this.
pub fn encode_report_line(word: u64) -> String {
    let mut line = STANDARD.encode(word.to_le_bytes());
    line.push('\n');
    line
}

/// Parse one line received from the rig.
///
/// The payload must be exactly one word; the format id lives in the last
/// byte, so a shorter payload is rejected rather than padded.
pub fn decode_report_line(line: &str) -> Result<u64, DecodeError> {
    let bytes = decode_base64(line)?;
    let buf: [u8; WORD_BYTES] = bytes.as_slice().try_into().map_err(|_| {
        DecodeError::Malformed(format!("expected {WORD_BYTES} bytes, got {}", bytes.len()))
    })?;
    Ok(u64::from_le_bytes(buf))
}

fn decode_base64(line: &str) -> Result<Vec<u8>, DecodeError> {
    let payload = line.trim();
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| DecodeError::Malformed(format!("invalid base64 {payload:?}: {e}")))?;
    if bytes.is_empty() || bytes.len() > WORD_BYTES {
        return Err(DecodeError::Malformed(format!(
            "expected 1 to {WORD_BYTES} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}
