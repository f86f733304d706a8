use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::types::method::is_token_byte;

/// SIP header names the switchboard inspects.
///
/// Header names are case-insensitive on the wire and may use the RFC 3261
/// compact forms (`i`, `f`, `t`, `m`, `l`, `c`, `v`, `k`); both normalize to
/// the same variant. Anything else is kept in [`HeaderName::Other`].
///
/// ```rust
/// use switchboard_sip_core::types::HeaderName;
///
/// assert_eq!("i".parse::<HeaderName>().unwrap(), HeaderName::CallId);
/// assert_eq!("call-id".parse::<HeaderName>().unwrap(), HeaderName::CallId);
/// assert_eq!(HeaderName::CallId.as_str(), "Call-ID");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeaderName {
    /// Call-ID: Unique identifier for this call
    CallId,
    /// Contact: Where subsequent requests should be sent
    Contact,
    /// Content-Length: Size of the message body
    ContentLength,
    /// Content-Type: Media type of the message body
    ContentType,
    /// CSeq: Command sequence number
    CSeq,
    /// From: Initiator of the request
    From,
    /// To: Logical recipient of the request
    To,
    /// Via: Path taken by the request so far
    Via,
    /// Max-Forwards: Limit on the number of proxies or gateways
    MaxForwards,
    /// Allow: Methods supported by the UA
    Allow,
    /// Supported: Extensions supported by the UA
    Supported,
    /// User-Agent: Software of the originating UA
    UserAgent,
    /// Server: Software of the answering UAS
    Server,
    /// Event: Event package of a NOTIFY
    Event,
    /// Subscription-State: State of the implicit REFER subscription
    SubscriptionState,
    /// Refer-To: Transfer target
    ReferTo,
    /// Referred-By: Transferor identity
    ReferredBy,
    /// Any other header, spelled as received
    Other(String),
}

impl HeaderName {
    pub fn as_str(&self) -> &str {
        match self {
            HeaderName::CallId => "Call-ID",
            HeaderName::Contact => "Contact",
            HeaderName::ContentLength => "Content-Length",
            HeaderName::ContentType => "Content-Type",
            HeaderName::CSeq => "CSeq",
            HeaderName::From => "From",
            HeaderName::To => "To",
            HeaderName::Via => "Via",
            HeaderName::MaxForwards => "Max-Forwards",
            HeaderName::Allow => "Allow",
            HeaderName::Supported => "Supported",
            HeaderName::UserAgent => "User-Agent",
            HeaderName::Server => "Server",
            HeaderName::Event => "Event",
            HeaderName::SubscriptionState => "Subscription-State",
            HeaderName::ReferTo => "Refer-To",
            HeaderName::ReferredBy => "Referred-By",
            HeaderName::Other(name) => name,
        }
    }

    /// Case-insensitive comparison, so `Other("x-foo")` matches `Other("X-Foo")`
    pub fn matches(&self, other: &HeaderName) -> bool {
        match (self, other) {
            (HeaderName::Other(a), HeaderName::Other(b)) => a.eq_ignore_ascii_case(b),
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HeaderName {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(is_token_byte) {
            return Err(ParseError::header(s, "invalid header name"));
        }

        let lower_s = s.to_ascii_lowercase();
        Ok(match lower_s.as_str() {
            "call-id" | "i" => HeaderName::CallId,
            "contact" | "m" => HeaderName::Contact,
            "content-length" | "l" => HeaderName::ContentLength,
            "content-type" | "c" => HeaderName::ContentType,
            "cseq" => HeaderName::CSeq,
            "from" | "f" => HeaderName::From,
            "to" | "t" => HeaderName::To,
            "via" | "v" => HeaderName::Via,
            "max-forwards" => HeaderName::MaxForwards,
            "allow" => HeaderName::Allow,
            "supported" | "k" => HeaderName::Supported,
            "user-agent" => HeaderName::UserAgent,
            "server" => HeaderName::Server,
            "event" | "o" => HeaderName::Event,
            "subscription-state" => HeaderName::SubscriptionState,
            "refer-to" | "r" => HeaderName::ReferTo,
            "referred-by" | "b" => HeaderName::ReferredBy,
            _ => HeaderName::Other(s.to_string()),
        })
    }
}

/// One header field line, value kept raw
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: HeaderName,
    pub value: String,
}

impl Header {
    pub fn new(name: HeaderName, value: impl Into<String>) -> Self {
        Header {
            name,
            value: value.into(),
        }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}
