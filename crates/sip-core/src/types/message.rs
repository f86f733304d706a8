use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{ParseError, Result};
use crate::types::address::NameAddr;
use crate::types::cseq::CSeq;
use crate::types::header::{Header, HeaderName};
use crate::types::method::Method;
use crate::types::status::StatusCode;
use crate::types::uri::SipUri;
use crate::types::via::Via;

pub const SIP_VERSION: &str = "SIP/2.0";

/// Typed access to the header list shared by requests and responses
pub trait HeaderAccess {
    fn headers(&self) -> &[Header];
    fn headers_mut(&mut self) -> &mut Vec<Header>;

    /// First value for `name`
    fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers()
            .iter()
            .find(|h| h.name.matches(name))
            .map(|h| h.value.as_str())
    }

    /// Every value for `name`, in message order
    fn header_values<'a>(&'a self, name: &'a HeaderName) -> Box<dyn Iterator<Item = &'a str> + 'a> {
        Box::new(
            self.headers()
                .iter()
                .filter(move |h| h.name.matches(name))
                .map(|h| h.value.as_str()),
        )
    }

    /// Replace all occurrences of `name` with a single value
    fn set_header(&mut self, name: HeaderName, value: impl Into<String>) {
        let value = value.into();
        let headers = self.headers_mut();
        match headers.iter().position(|h| h.name.matches(&name)) {
            Some(i) => {
                headers[i].value = value;
                let mut seen = 0usize;
                headers.retain(|h| {
                    if h.name.matches(&name) {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
            }
            None => headers.push(Header::new(name, value)),
        }
    }

    fn push_header(&mut self, name: HeaderName, value: impl Into<String>) {
        self.headers_mut().push(Header::new(name, value));
    }

    fn remove_header(&mut self, name: &HeaderName) {
        self.headers_mut().retain(|h| !h.name.matches(name));
    }

    fn required(&self, name: HeaderName, label: &'static str) -> Result<&str> {
        self.header(&name)
            .ok_or(ParseError::MissingHeader { name: label })
    }

    fn call_id(&self) -> Result<&str> {
        self.required(HeaderName::CallId, "Call-ID")
    }

    fn cseq(&self) -> Result<CSeq> {
        self.required(HeaderName::CSeq, "CSeq")?.parse()
    }

    fn from_addr(&self) -> Result<NameAddr> {
        self.required(HeaderName::From, "From")?.parse()
    }

    fn to_addr(&self) -> Result<NameAddr> {
        self.required(HeaderName::To, "To")?.parse()
    }

    fn contact(&self) -> Option<NameAddr> {
        self.header(&HeaderName::Contact).and_then(|c| c.parse().ok())
    }

    /// Topmost Via
    fn via(&self) -> Result<Via> {
        self.required(HeaderName::Via, "Via")?.parse()
    }

    fn content_type(&self) -> Option<&str> {
        self.header(&HeaderName::ContentType)
    }

    fn user_agent(&self) -> Option<&str> {
        self.header(&HeaderName::UserAgent)
    }
}

/// A SIP request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub method: Method,
    pub uri: SipUri,
    pub headers: Vec<Header>,
    pub body: Bytes,
}

impl Request {
    pub fn new(method: Method, uri: SipUri) -> Self {
        Request {
            method,
            uri,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let start = format!("{} {} {}", self.method, self.uri, SIP_VERSION);
        serialize(&start, &self.headers, &self.body)
    }
}

impl HeaderAccess for Request {
    fn headers(&self) -> &[Header] {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Vec<Header> {
        &mut self.headers
    }
}

/// A SIP response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: StatusCode,
    pub reason: String,
    pub headers: Vec<Header>,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Response {
            status,
            reason: status.reason_phrase().to_string(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let start = format!("{} {} {}", SIP_VERSION, self.status.as_u16(), self.reason);
        serialize(&start, &self.headers, &self.body)
    }
}

impl HeaderAccess for Response {
    fn headers(&self) -> &[Header] {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Vec<Header> {
        &mut self.headers
    }
}

/// Either kind of SIP message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Request(Request),
    Response(Response),
}

impl Message {
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Message::Request(r) => r.to_bytes(),
            Message::Response(r) => r.to_bytes(),
        }
    }

    pub fn call_id(&self) -> Result<&str> {
        match self {
            Message::Request(r) => r.call_id(),
            Message::Response(r) => r.call_id(),
        }
    }

    pub fn body(&self) -> &Bytes {
        match self {
            Message::Request(r) => &r.body,
            Message::Response(r) => &r.body,
        }
    }
}

impl From<Request> for Message {
    fn from(r: Request) -> Self {
        Message::Request(r)
    }
}

impl From<Response> for Message {
    fn from(r: Response) -> Self {
        Message::Response(r)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.to_bytes()))
    }
}

/// Start line, headers (any stored Content-Length replaced by the computed
/// one), blank line, body.
fn serialize(start: &str, headers: &[Header], body: &Bytes) -> Bytes {
    let mut buf = BytesMut::with_capacity(start.len() + headers.len() * 48 + body.len() + 32);
    buf.put_slice(start.as_bytes());
    buf.put_slice(b"\r\n");
    for header in headers {
        if header.name == HeaderName::ContentLength {
            continue;
        }
        buf.put_slice(header.to_string().as_bytes());
        buf.put_slice(b"\r\n");
    }
    buf.put_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
    buf.put_slice(body);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Request {
        let mut req = Request::new(Method::Options, "sip:pbx.example.com".parse().unwrap());
        req.push_header(HeaderName::Via, "SIP/2.0/UDP 10.0.0.2:5060;branch=z9hG4bK1");
        req.push_header(HeaderName::Via, "SIP/2.0/UDP 10.0.0.3:5060;branch=z9hG4bK2");
        req.push_header(HeaderName::CallId, "abc@10.0.0.2");
        req.push_header(HeaderName::ContentLength, "999");
        req
    }

    #[test]
    fn content_length_is_recomputed() {
        let mut req = sample();
        req.body = Bytes::from_static(b"hello");
        let wire = String::from_utf8(req.to_bytes().to_vec()).unwrap();
        assert!(wire.starts_with("OPTIONS sip:pbx.example.com SIP/2.0\r\n"));
        assert!(wire.contains("Content-Length: 5\r\n\r\nhello"));
        assert!(!wire.contains("999"));
    }

    #[test]
    fn duplicate_headers_keep_order() {
        let req = sample();
        let vias: Vec<_> = req.header_values(&HeaderName::Via).collect();
        assert_eq!(vias.len(), 2);
        assert!(vias[0].ends_with("z9hG4bK1"));
        assert_eq!(req.via().unwrap().branch(), Some("z9hG4bK1"));
    }

    #[test]
    fn set_header_collapses_duplicates() {
        let mut req = sample();
        req.set_header(HeaderName::Via, "SIP/2.0/UDP 10.0.0.9;branch=z9hG4bK9");
        assert_eq!(req.header_values(&HeaderName::Via).count(), 1);
        assert_eq!(req.headers[0].name, HeaderName::Via);
    }

    #[test]
    fn missing_mandatory_header_is_reported() {
        let req = Request::new(Method::Bye, "sip:a@b".parse().unwrap());
        assert_eq!(req.cseq(), Err(ParseError::MissingHeader { name: "CSeq" }));
    }

    #[test]
    fn response_start_line() {
        let resp = Response::new(StatusCode::NotAcceptableHere);
        let wire = resp.to_bytes();
        assert!(wire.starts_with(b"SIP/2.0 488 Not Acceptable Here\r\n"));
        assert!(wire.ends_with(b"Content-Length: 0\r\n\r\n"));
    }
}
