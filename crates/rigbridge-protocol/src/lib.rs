//! `rigbridge-protocol` – the rig's binary wire format.
//!
//! Pure functions only; nothing here touches a port or a socket.
//!
//! # Modules
//!
//! - [`codec`] – packs and unpacks 64-bit device words and decodes them into
//!   [`DeviceFrame`][rigbridge_types::DeviceFrame] values.
//! - [`command`] – [`DeviceCommand`], the typed catalogue of words the
//!   gateway sends to the rig.
//! - [`framing`] – base64 text lines carrying one word each.

pub mod codec;
pub mod command;
pub mod framing;

pub use codec::{PaddingPolicy, decode, encode_frame, format_id};
pub use command::DeviceCommand;
pub use framing::{decode_command_line, decode_report_line, encode_command_line, encode_report_line};
