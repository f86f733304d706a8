//! # Touch-tone signaling
//!
//! Digits reach the switchboard three ways:
//!
//! - [`rfc4733`]: telephone-event packets inside the RTP stream
//! - [`info`]: `Signal=`/`Duration=` bodies carried by SIP INFO
//! - [`goertzel`]: dual-tone energy detected in decoded G.711 audio
//!
//! [`receiver::DtmfReceiver`] merges whichever of them is active for a call
//! into one digit stream, counting a digit reported by two paths once.

pub mod goertzel;
pub mod info;
pub mod receiver;
pub mod rfc4733;

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

pub use goertzel::{generate_dtmf, generate_tone, ToneDetector, ToneDetectorConfig};
pub use info::{format_info_body, parse_info_body, InfoDigit, DTMF_RELAY_CONTENT_TYPE};
pub use receiver::DtmfReceiver;
pub use rfc4733::{EventDecoder, EventEncoder};

/// DTMF tone definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DtmfDigit {
    Digit0,
    Digit1,
    Digit2,
    Digit3,
    Digit4,
    Digit5,
    Digit6,
    Digit7,
    Digit8,
    Digit9,
    Star,
    Pound,
    A,
    B,
    C,
    D,
}

impl DtmfDigit {
    /// Every digit in telephone-event code order
    pub const ALL: [DtmfDigit; 16] = [
        Self::Digit0,
        Self::Digit1,
        Self::Digit2,
        Self::Digit3,
        Self::Digit4,
        Self::Digit5,
        Self::Digit6,
        Self::Digit7,
        Self::Digit8,
        Self::Digit9,
        Self::Star,
        Self::Pound,
        Self::A,
        Self::B,
        Self::C,
        Self::D,
    ];

    pub fn to_char(self) -> char {
        match self {
            Self::Digit0 => '0',
            Self::Digit1 => '1',
            Self::Digit2 => '2',
            Self::Digit3 => '3',
            Self::Digit4 => '4',
            Self::Digit5 => '5',
            Self::Digit6 => '6',
            Self::Digit7 => '7',
            Self::Digit8 => '8',
            Self::Digit9 => '9',
            Self::Star => '*',
            Self::Pound => '#',
            Self::A => 'A',
            Self::B => 'B',
            Self::C => 'C',
            Self::D => 'D',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(Self::Digit0),
            '1' => Some(Self::Digit1),
            '2' => Some(Self::Digit2),
            '3' => Some(Self::Digit3),
            '4' => Some(Self::Digit4),
            '5' => Some(Self::Digit5),
            '6' => Some(Self::Digit6),
            '7' => Some(Self::Digit7),
            '8' => Some(Self::Digit8),
            '9' => Some(Self::Digit9),
            '*' => Some(Self::Star),
            '#' => Some(Self::Pound),
            'A' | 'a' => Some(Self::A),
            'B' | 'b' => Some(Self::B),
            'C' | 'c' => Some(Self::C),
            'D' | 'd' => Some(Self::D),
            _ => None,
        }
    }

    /// RFC 4733 event code (0-15)
    pub fn event_code(self) -> u8 {
        self as u8
    }

    pub fn from_event_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Row and column frequencies in Hz
    pub fn frequencies(self) -> (f64, f64) {
        let (row, col) = match self {
            Self::Digit1 => (0, 0),
            Self::Digit2 => (0, 1),
            Self::Digit3 => (0, 2),
            Self::A => (0, 3),
            Self::Digit4 => (1, 0),
            Self::Digit5 => (1, 1),
            Self::Digit6 => (1, 2),
            Self::B => (1, 3),
            Self::Digit7 => (2, 0),
            Self::Digit8 => (2, 1),
            Self::Digit9 => (2, 2),
            Self::C => (2, 3),
            Self::Star => (3, 0),
            Self::Digit0 => (3, 1),
            Self::Pound => (3, 2),
            Self::D => (3, 3),
        };
        (goertzel::ROW_FREQUENCIES[row], goertzel::COLUMN_FREQUENCIES[col])
    }
}

impl fmt::Display for DtmfDigit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

/// One telephone event as carried on the wire.
///
/// `duration` is in media clock units, not milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToneEvent {
    pub digit: DtmfDigit,
    pub end: bool,
    /// Power level in -dBm0, 0..=63
    pub volume: u8,
    pub duration: u16,
}

impl ToneEvent {
    pub fn new(digit: DtmfDigit, end: bool, volume: u8, duration: u16) -> Self {
        Self {
            digit,
            end,
            volume,
            duration,
        }
    }

    /// Duration converted to milliseconds for a given clock rate
    pub fn duration_ms(&self, clock_rate: u32) -> u32 {
        (self.duration as u64 * 1000 / clock_rate.max(1) as u64) as u32
    }
}

/// Which path reported a digit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtmfSource {
    Rfc4733,
    Info,
    Inband,
}

impl fmt::Display for DtmfSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DtmfSource::Rfc4733 => "rfc4733",
            DtmfSource::Info => "info",
            DtmfSource::Inband => "inband",
        };
        f.write_str(s)
    }
}

/// A digit accepted by the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedDigit {
    pub digit: DtmfDigit,
    pub source: DtmfSource,
    pub duration_ms: u32,
    pub at: Instant,
}
