use bytes::Bytes;

use crate::types::header::HeaderName;
use crate::types::message::{HeaderAccess, Request, Response};
use crate::types::method::Method;
use crate::types::status::StatusCode;

/// Builds a response to a received request.
///
/// Via (every hop, in order), From, To, Call-ID and CSeq are copied from the
/// request as RFC 3261 Section 8.2.6.2 requires.
pub struct SimpleResponseBuilder {
    response: Response,
}

impl SimpleResponseBuilder {
    pub fn new(status: StatusCode) -> Self {
        SimpleResponseBuilder {
            response: Response::new(status),
        }
    }

    pub fn response_to(request: &Request, status: StatusCode) -> Self {
        let mut response = Response::new(status);
        for header in request.headers() {
            if matches!(
                header.name,
                HeaderName::Via
                    | HeaderName::From
                    | HeaderName::To
                    | HeaderName::CallId
                    | HeaderName::CSeq
            ) {
                response.headers.push(header.clone());
            }
        }
        SimpleResponseBuilder { response }
    }

    /// Add a To tag unless the request already had one
    pub fn to_tag(mut self, tag: &str) -> Self {
        if let Ok(to) = self.response.to_addr() {
            if to.tag().is_none() {
                self.response
                    .set_header(HeaderName::To, to.with_tag(tag).to_string());
            }
        }
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.response.reason = reason.into();
        self
    }

    pub fn contact(mut self, contact: impl Into<String>) -> Self {
        self.response.set_header(HeaderName::Contact, contact);
        self
    }

    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.response.set_header(HeaderName::Server, server);
        self
    }

    pub fn allow(mut self, methods: &[Method]) -> Self {
        let list = methods.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
        self.response.set_header(HeaderName::Allow, list);
        self
    }

    pub fn header(mut self, name: HeaderName, value: impl Into<String>) -> Self {
        self.response.push_header(name, value);
        self
    }

    pub fn body(mut self, content_type: &str, body: impl Into<Bytes>) -> Self {
        self.response.set_header(HeaderName::ContentType, content_type);
        self.response.body = body.into();
        self
    }

    pub fn build(self) -> Response {
        self.response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_message;
    use crate::types::Message;

    fn invite() -> Request {
        let raw = "INVITE sip:0@pbx SIP/2.0\r\n\
            Via: SIP/2.0/UDP 10.0.0.5:5060;branch=z9hG4bKa\r\n\
            Via: SIP/2.0/UDP 10.0.0.1:5060;branch=z9hG4bKb\r\n\
            From: <sip:1001@pbx>;tag=caller\r\n\
            To: <sip:0@pbx>\r\n\
            Call-ID: c1@10.0.0.5\r\n\
            CSeq: 4 INVITE\r\n\
            Max-Forwards: 70\r\n\r\n";
        match parse_message(raw.as_bytes()).unwrap() {
            Message::Request(r) => r,
            Message::Response(_) => unreachable!(),
        }
    }

    #[test]
    fn copies_dialog_headers_and_adds_tag() {
        let resp = SimpleResponseBuilder::response_to(&invite(), StatusCode::Ok)
            .to_tag("uas1")
            .build();
        let vias: Vec<_> = resp.header_values(&HeaderName::Via).collect();
        assert_eq!(vias.len(), 2);
        assert!(vias[1].contains("z9hG4bKb"));
        assert_eq!(resp.to_addr().unwrap().tag(), Some("uas1"));
        assert_eq!(resp.from_addr().unwrap().tag(), Some("caller"));
        assert_eq!(resp.cseq().unwrap().seq, 4);
        assert!(resp.header(&HeaderName::MaxForwards).is_none());
    }

    #[test]
    fn existing_to_tag_is_kept() {
        let mut req = invite();
        req.set_header(HeaderName::To, "<sip:0@pbx>;tag=already");
        let resp = SimpleResponseBuilder::response_to(&req, StatusCode::Ok)
            .to_tag("other")
            .build();
        assert_eq!(resp.to_addr().unwrap().tag(), Some("already"));
    }

    #[test]
    fn body_sets_content_type() {
        let resp = SimpleResponseBuilder::response_to(&invite(), StatusCode::Ok)
            .body("application/sdp", "v=0\r\n")
            .build();
        assert_eq!(resp.content_type(), Some("application/sdp"));
        assert!(resp.to_bytes().ends_with(b"Content-Length: 5\r\n\r\nv=0\r\n"));
    }
}
