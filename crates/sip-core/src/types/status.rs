//! # SIP Status Codes
//!
//! The subset of RFC 3261 Section 21 status codes the switchboard emits or
//! reacts to. Any other code in `100..=699` is preserved as
//! [`StatusCode::Custom`].
//!
//! ```rust
//! use switchboard_sip_core::types::StatusCode;
//!
//! let status = StatusCode::from_u16(488).unwrap();
//! assert_eq!(status, StatusCode::NotAcceptableHere);
//! assert!(status.is_client_error());
//! assert_eq!(status.to_string(), "488 Not Acceptable Here");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// SIP response status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    // 1xx: Provisional
    /// 100 Trying
    Trying,
    /// 180 Ringing
    Ringing,
    /// 183 Session Progress
    SessionProgress,

    // 2xx: Success
    /// 200 OK
    Ok,
    /// 202 Accepted
    Accepted,

    // 3xx: Redirection
    /// 302 Moved Temporarily
    MovedTemporarily,

    // 4xx: Client Error
    /// 400 Bad Request
    BadRequest,
    /// 403 Forbidden
    Forbidden,
    /// 404 Not Found
    NotFound,
    /// 408 Request Timeout
    RequestTimeout,
    /// 480 Temporarily Unavailable
    TemporarilyUnavailable,
    /// 481 Call/Transaction Does Not Exist
    CallOrTransactionDoesNotExist,
    /// 486 Busy Here
    BusyHere,
    /// 487 Request Terminated
    RequestTerminated,
    /// 488 Not Acceptable Here
    NotAcceptableHere,

    // 5xx: Server Error
    /// 500 Server Internal Error
    ServerInternalError,
    /// 501 Not Implemented
    NotImplemented,
    /// 503 Service Unavailable
    ServiceUnavailable,

    // 6xx: Global Failure
    /// 603 Decline
    Decline,

    /// Any other valid code
    Custom(u16),
}

impl StatusCode {
    /// Map a numeric code, rejecting values outside `100..=699`
    pub fn from_u16(code: u16) -> Result<Self, ParseError> {
        Ok(match code {
            100 => StatusCode::Trying,
            180 => StatusCode::Ringing,
            183 => StatusCode::SessionProgress,
            200 => StatusCode::Ok,
            202 => StatusCode::Accepted,
            302 => StatusCode::MovedTemporarily,
            400 => StatusCode::BadRequest,
            403 => StatusCode::Forbidden,
            404 => StatusCode::NotFound,
            408 => StatusCode::RequestTimeout,
            480 => StatusCode::TemporarilyUnavailable,
            481 => StatusCode::CallOrTransactionDoesNotExist,
            486 => StatusCode::BusyHere,
            487 => StatusCode::RequestTerminated,
            488 => StatusCode::NotAcceptableHere,
            500 => StatusCode::ServerInternalError,
            501 => StatusCode::NotImplemented,
            503 => StatusCode::ServiceUnavailable,
            603 => StatusCode::Decline,
            100..=699 => StatusCode::Custom(code),
            _ => return Err(ParseError::InvalidStatusCode(code)),
        })
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Trying => 100,
            StatusCode::Ringing => 180,
            StatusCode::SessionProgress => 183,
            StatusCode::Ok => 200,
            StatusCode::Accepted => 202,
            StatusCode::MovedTemporarily => 302,
            StatusCode::BadRequest => 400,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::RequestTimeout => 408,
            StatusCode::TemporarilyUnavailable => 480,
            StatusCode::CallOrTransactionDoesNotExist => 481,
            StatusCode::BusyHere => 486,
            StatusCode::RequestTerminated => 487,
            StatusCode::NotAcceptableHere => 488,
            StatusCode::ServerInternalError => 500,
            StatusCode::NotImplemented => 501,
            StatusCode::ServiceUnavailable => 503,
            StatusCode::Decline => 603,
            StatusCode::Custom(code) => *code,
        }
    }

    /// Default reason phrase
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Trying => "Trying",
            StatusCode::Ringing => "Ringing",
            StatusCode::SessionProgress => "Session Progress",
            StatusCode::Ok => "OK",
            StatusCode::Accepted => "Accepted",
            StatusCode::MovedTemporarily => "Moved Temporarily",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::RequestTimeout => "Request Timeout",
            StatusCode::TemporarilyUnavailable => "Temporarily Unavailable",
            StatusCode::CallOrTransactionDoesNotExist => "Call/Transaction Does Not Exist",
            StatusCode::BusyHere => "Busy Here",
            StatusCode::RequestTerminated => "Request Terminated",
            StatusCode::NotAcceptableHere => "Not Acceptable Here",
            StatusCode::ServerInternalError => "Server Internal Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::ServiceUnavailable => "Service Unavailable",
            StatusCode::Decline => "Decline",
            StatusCode::Custom(_) => "Unknown",
        }
    }

    pub fn is_provisional(&self) -> bool {
        (100..200).contains(&self.as_u16())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.as_u16())
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.as_u16())
    }

    /// Final responses are everything at or above 200
    pub fn is_final(&self) -> bool {
        self.as_u16() >= 200
    }

    /// Any 3xx-6xx response
    pub fn is_failure(&self) -> bool {
        self.as_u16() >= 300
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_known_codes() {
        for code in [100u16, 180, 200, 202, 404, 481, 487, 488, 501, 503] {
            assert_eq!(StatusCode::from_u16(code).unwrap().as_u16(), code);
        }
    }

    #[test]
    fn custom_and_invalid() {
        assert_eq!(StatusCode::from_u16(499).unwrap(), StatusCode::Custom(499));
        assert_eq!(StatusCode::from_u16(99), Err(ParseError::InvalidStatusCode(99)));
        assert_eq!(StatusCode::from_u16(700), Err(ParseError::InvalidStatusCode(700)));
    }

    #[test]
    fn classes() {
        assert!(StatusCode::Ringing.is_provisional());
        assert!(!StatusCode::Ringing.is_final());
        assert!(StatusCode::Accepted.is_success());
        assert!(StatusCode::RequestTerminated.is_failure());
    }
}
