//! SIP INFO digit bodies.
//!
//! `application/dtmf-relay` carries two lines:
//!
//! ```text
//! Signal=5
//! Duration=160
//! ```
//!
//! `application/dtmf` carries the bare digit. Both are accepted on receive.

use super::DtmfDigit;
use crate::error::{MediaError, Result};

pub const DTMF_RELAY_CONTENT_TYPE: &str = "application/dtmf-relay";
pub const DTMF_CONTENT_TYPE: &str = "application/dtmf";

/// Duration assumed when a body omits it
pub const DEFAULT_INFO_DURATION_MS: u32 = 250;

/// A digit carried by an INFO request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoDigit {
    pub digit: DtmfDigit,
    pub duration_ms: u32,
}

/// Parse an INFO body
pub fn parse_info_body(body: &str) -> Result<InfoDigit> {
    let trimmed = body.trim();
    let mut lines = trimmed.lines().map(str::trim).filter(|l| !l.is_empty()).peekable();

    // application/dtmf: the body is the digit itself
    if let Some(first) = lines.peek() {
        if !first.contains('=') {
            let mut chars = first.chars();
            return match (chars.next().and_then(DtmfDigit::from_char), chars.next()) {
                (Some(digit), None) => Ok(InfoDigit {
                    digit,
                    duration_ms: DEFAULT_INFO_DURATION_MS,
                }),
                _ => Err(MediaError::invalid_event(format!("unrecognized INFO body {:?}", first))),
            };
        }
    }

    let mut digit = None;
    let mut duration_ms = DEFAULT_INFO_DURATION_MS;
    for line in lines {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "signal" => {
                let mut chars = value.chars();
                digit = match (chars.next(), chars.next()) {
                    (Some(c), None) => DtmfDigit::from_char(c),
                    // some phones send the event code for * and #
                    _ => value.parse::<u8>().ok().and_then(DtmfDigit::from_event_code),
                };
                if digit.is_none() {
                    return Err(MediaError::invalid_event(format!("bad Signal value {:?}", value)));
                }
            }
            "duration" => {
                duration_ms = value
                    .parse()
                    .map_err(|_| MediaError::invalid_event(format!("bad Duration value {:?}", value)))?;
            }
            _ => {}
        }
    }

    digit
        .map(|digit| InfoDigit { digit, duration_ms })
        .ok_or_else(|| MediaError::invalid_event("INFO body has no Signal line"))
}

/// Format an `application/dtmf-relay` body
pub fn format_info_body(digit: DtmfDigit, duration_ms: u32) -> String {
    format!("Signal={}\r\nDuration={}\r\n", digit, duration_ms)
}
