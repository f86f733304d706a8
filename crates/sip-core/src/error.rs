//! Error types for SIP and SDP handling.

use thiserror::Error;

/// Result alias for parse operations
pub type Result<T> = std::result::Result<T, ParseError>;

/// A SIP message or SDP body could not be decoded.
///
/// A message that yields any of these is dropped as a whole; no partially
/// parsed state is ever handed to a caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No blank line separating head from body
    #[error("Incomplete message: missing header terminator")]
    Incomplete,

    /// Head section is not valid UTF-8
    #[error("Message head is not valid UTF-8")]
    InvalidUtf8,

    /// Request-Line or Status-Line could not be parsed
    #[error("Invalid start line: {line}")]
    InvalidStartLine { line: String },

    /// A header line is malformed or a header value is unparseable
    #[error("Invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    /// A header required for every message is absent
    #[error("Missing mandatory header: {name}")]
    MissingHeader { name: &'static str },

    /// Content-Length promises more bytes than were received
    #[error("Content-Length mismatch: declared {declared}, received {actual}")]
    ContentLengthMismatch { declared: usize, actual: usize },

    /// Status code outside 100..=699
    #[error("Invalid status code: {0}")]
    InvalidStatusCode(u16),

    /// SIP URI could not be parsed
    #[error("Invalid URI: {uri}")]
    InvalidUri { uri: String },

    /// SDP body is malformed
    #[error("Invalid SDP: {reason}")]
    InvalidSdp { reason: String },
}

impl ParseError {
    pub fn header(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ParseError::InvalidHeader {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn sdp(reason: impl Into<String>) -> Self {
        ParseError::InvalidSdp {
            reason: reason.into(),
        }
    }
}

/// Codec negotiation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    /// Device filtering left nothing but telephone-event (or nothing at all)
    #[error("No common codec for device {device}: offered {offered:?}")]
    NoCommonCodec { offered: Vec<u8>, device: String },
}
