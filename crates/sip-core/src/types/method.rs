use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// SIP request methods.
///
/// Unknown tokens are kept verbatim in [`Method::Extension`] so they can be
/// answered with `501 Not Implemented` instead of being rejected as malformed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Invite,
    Ack,
    Bye,
    Cancel,
    Refer,
    Info,
    Options,
    Notify,
    Register,
    Update,
    Extension(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Invite => "INVITE",
            Method::Ack => "ACK",
            Method::Bye => "BYE",
            Method::Cancel => "CANCEL",
            Method::Refer => "REFER",
            Method::Info => "INFO",
            Method::Options => "OPTIONS",
            Method::Notify => "NOTIFY",
            Method::Register => "REGISTER",
            Method::Update => "UPDATE",
            Method::Extension(name) => name,
        }
    }

    /// Methods the coordinator answers, advertised in `Allow`
    pub fn supported() -> &'static [Method] {
        &[
            Method::Invite,
            Method::Ack,
            Method::Bye,
            Method::Cancel,
            Method::Refer,
            Method::Info,
            Method::Options,
        ]
    }

    /// Whether a 2xx to this method establishes a dialog
    pub fn creates_dialog(&self) -> bool {
        matches!(self, Method::Invite)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(is_token_byte) {
            return Err(ParseError::InvalidStartLine {
                line: format!("bad method token {:?}", s),
            });
        }
        // Method names are case-sensitive (RFC 3261 7.1)
        Ok(match s {
            "INVITE" => Method::Invite,
            "ACK" => Method::Ack,
            "BYE" => Method::Bye,
            "CANCEL" => Method::Cancel,
            "REFER" => Method::Refer,
            "INFO" => Method::Info,
            "OPTIONS" => Method::Options,
            "NOTIFY" => Method::Notify,
            "REGISTER" => Method::Register,
            "UPDATE" => Method::Update,
            other => Method::Extension(other.to_string()),
        })
    }
}

pub(crate) fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"-.!%*_+`'~".contains(&b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_extension_methods() {
        assert_eq!("INVITE".parse::<Method>().unwrap(), Method::Invite);
        assert_eq!("REFER".parse::<Method>().unwrap(), Method::Refer);
        assert_eq!(
            "PUBLISH".parse::<Method>().unwrap(),
            Method::Extension("PUBLISH".into())
        );
        assert_eq!(Method::Extension("PUBLISH".into()).to_string(), "PUBLISH");
    }

    #[test]
    fn rejects_non_token() {
        assert!("IN VITE".parse::<Method>().is_err());
        assert!("".parse::<Method>().is_err());
    }
}
