//! Error types for the media plane.

use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

/// Result alias for media operations
pub type Result<T> = std::result::Result<T, MediaError>;

/// Media socket allocation and I/O failures
#[derive(Error, Debug)]
pub enum SocketError {
    /// A specific address could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Every port in the configured range is in use or failed to bind
    #[error("RTP port range {start}-{end} exhausted on {ip}")]
    PortRangeExhausted { ip: IpAddr, start: u16, end: u16 },

    /// Send/receive failure on a bound socket
    #[error("Socket I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Media plane errors
#[derive(Error, Debug)]
pub enum MediaError {
    #[error(transparent)]
    Socket(#[from] SocketError),

    /// RTP/RTCP datagram could not be decoded
    #[error("Invalid packet: {details}")]
    InvalidPacket { details: String },

    /// Telephone-event payload or INFO body could not be decoded
    #[error("Invalid tone event: {details}")]
    InvalidEvent { details: String },

    /// The relay task has already stopped
    #[error("Media relay for call {call_id} is closed")]
    RelayClosed { call_id: String },
}

impl MediaError {
    pub fn invalid_packet(details: impl Into<String>) -> Self {
        MediaError::InvalidPacket {
            details: details.into(),
        }
    }

    pub fn invalid_event(details: impl Into<String>) -> Self {
        MediaError::InvalidEvent {
            details: details.into(),
        }
    }
}
