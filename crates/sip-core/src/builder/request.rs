use bytes::Bytes;

use crate::types::address::NameAddr;
use crate::types::cseq::CSeq;
use crate::types::header::HeaderName;
use crate::types::message::{HeaderAccess, Request};
use crate::types::method::Method;
use crate::types::uri::SipUri;
use crate::types::via::Via;

/// Fluent construction of an outgoing request
pub struct SimpleRequestBuilder {
    request: Request,
}

impl SimpleRequestBuilder {
    pub fn new(method: Method, uri: SipUri) -> Self {
        let mut request = Request::new(method, uri);
        request.push_header(HeaderName::MaxForwards, "70");
        SimpleRequestBuilder { request }
    }

    pub fn via(mut self, via: Via) -> Self {
        self.request.push_header(HeaderName::Via, via.to_string());
        self
    }

    pub fn from(mut self, from: &NameAddr) -> Self {
        self.request.set_header(HeaderName::From, from.to_string());
        self
    }

    pub fn to(mut self, to: &NameAddr) -> Self {
        self.request.set_header(HeaderName::To, to.to_string());
        self
    }

    pub fn call_id(mut self, call_id: impl Into<String>) -> Self {
        self.request.set_header(HeaderName::CallId, call_id);
        self
    }

    /// CSeq with the builder's own method
    pub fn cseq(mut self, seq: u32) -> Self {
        let cseq = CSeq::new(seq, self.request.method.clone());
        self.request.set_header(HeaderName::CSeq, cseq.to_string());
        self
    }

    pub fn contact(mut self, contact: &NameAddr) -> Self {
        self.request.set_header(HeaderName::Contact, contact.to_string());
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.request.set_header(HeaderName::UserAgent, ua);
        self
    }

    pub fn header(mut self, name: HeaderName, value: impl Into<String>) -> Self {
        self.request.push_header(name, value);
        self
    }

    pub fn body(mut self, content_type: &str, body: impl Into<Bytes>) -> Self {
        self.request.set_header(HeaderName::ContentType, content_type);
        self.request.body = body.into();
        self
    }

    pub fn build(self) -> Request {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_message;
    use crate::types::Message;

    #[test]
    fn built_request_parses() {
        let from: NameAddr = "<sip:switchboard@10.0.0.1>;tag=abc".parse().unwrap();
        let to: NameAddr = "<sip:2002@10.0.0.9>".parse().unwrap();
        let req = SimpleRequestBuilder::new(Method::Invite, to.uri.clone())
            .via(Via::udp("10.0.0.1", 5060, "z9hG4bKxyz"))
            .from(&from)
            .to(&to)
            .call_id("b-leg@10.0.0.1")
            .cseq(1)
            .contact(&"<sip:switchboard@10.0.0.1:5060>".parse().unwrap())
            .body("application/sdp", "v=0\r\n")
            .build();

        let Message::Request(parsed) = parse_message(&req.to_bytes()).unwrap() else {
            panic!("expected request");
        };
        assert_eq!(parsed.method, Method::Invite);
        assert_eq!(parsed.cseq().unwrap(), CSeq::new(1, Method::Invite));
        assert_eq!(parsed.via().unwrap().branch(), Some("z9hG4bKxyz"));
        assert_eq!(&parsed.body[..], b"v=0\r\n");
    }
}
