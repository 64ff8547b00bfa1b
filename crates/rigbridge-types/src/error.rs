//! Error taxonomy.
//!
//! | Type | Raised by | Handling |
//! |---|---|---|
//! | [`DecodeError`] | binary codec, line framing | log and drop the frame |
//! | [`ParseError`] | front-end message translator | log and drop the datagram |
//! | [`DispatchError`] | command dispatcher | log, reply nothing |
//! | [`TransportError`] | serial and UDP links | surfaced to the supervisor |

use std::time::Duration;

use thiserror::Error;

use crate::Motion;

/// A device word (or the line carrying it) could not be turned into a frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown format id {0}")]
    UnknownFormat(u8),

    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// A front-end datagram could not be turned into a [`FrontEndMessage`][crate::FrontEndMessage].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("unknown message type `{0}`")]
    UnknownMessageType(String),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid value for `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// A link to the device or the front end failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("{0} link disconnected")]
    Disconnected(String),

    #[error("I/O error on {link}: {message}")]
    Io { link: String, message: String },
}

impl TransportError {
    pub fn io(link: impl Into<String>, err: impl std::fmt::Display) -> Self {
        TransportError::Io {
            link: link.into(),
            message: err.to_string(),
        }
    }
}

/// A front-end request was understood but could not be carried out.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("{0} already in flight")]
    Busy(&'static str),

    #[error("no gain response within {0:?}")]
    Timeout(Duration),

    #[error("motion `{0}` is not implemented")]
    NotImplemented(Motion),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Top-level failure of the gateway process.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("gateway task failed: {0}")]
    Task(String),
}
