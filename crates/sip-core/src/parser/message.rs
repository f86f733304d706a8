//! SIP message parser (RFC 3261 Section 7).
//!
//! A datagram is split into head and body at the first empty line, folded
//! header lines are joined, and each line is run through a small `nom`
//! grammar. The body is cut to `Content-Length` when present. Any failure
//! rejects the whole message.

use bytes::Bytes;
use nom::{
    bytes::complete::{tag, tag_no_case, take_till1, take_while1, take_while_m_n},
    character::complete::{char, space0, space1},
    combinator::{all_consuming, map_res, rest},
    sequence::tuple,
    IResult,
};
use tracing::trace;

use crate::error::{ParseError, Result};
use crate::types::header::{Header, HeaderName};
use crate::types::message::{HeaderAccess, Message, Request, Response, SIP_VERSION};
use crate::types::method::{is_token_byte, Method};
use crate::types::status::StatusCode;

fn token(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii() && is_token_byte(c as u8))(input)
}

/// `Method SP Request-URI SP SIP-Version`
fn request_line(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, (method, _, uri, _, _)) = all_consuming(tuple((
        token,
        space1,
        take_till1(|c: char| c == ' '),
        space1,
        tag_no_case(SIP_VERSION),
    )))(input)?;
    Ok((input, (method, uri)))
}

/// `SIP-Version SP Status-Code SP Reason-Phrase`
fn status_line(input: &str) -> IResult<&str, (u16, &str)> {
    let (input, (_, _, code, _, reason)) = all_consuming(tuple((
        tag_no_case(SIP_VERSION),
        space1,
        map_res(take_while_m_n(3, 3, |c: char| c.is_ascii_digit()), str::parse::<u16>),
        space0,
        rest,
    )))(input)?;
    Ok((input, (code, reason)))
}

/// `field-name HCOLON field-value`
fn header_line(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, (name, _, _, _, value)) =
        all_consuming(tuple((token, space0, char(':'), space0, rest)))(input)?;
    Ok((input, (name, value.trim_end())))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Split at the first empty line, tolerating bare LF line endings
fn split_head(data: &[u8]) -> Result<(&[u8], &[u8])> {
    let start = data
        .iter()
        .position(|b| *b != b'\r' && *b != b'\n')
        .ok_or(ParseError::Incomplete)?;
    let data = &data[start..];
    let crlf = find(data, b"\r\n\r\n").map(|i| (i, 4));
    let lf = find(data, b"\n\n").map(|i| (i, 2));
    let (end, sep) = match (crlf, lf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return Err(ParseError::Incomplete),
    };
    Ok((&data[..end], &data[end + sep..]))
}

/// Split the head into logical lines, joining folded continuations
fn unfold(head: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in head.split('\n') {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(prev) = lines.last_mut() {
                prev.push(' ');
                prev.push_str(line.trim());
                continue;
            }
        }
        lines.push(line.to_string());
    }
    lines
}

/// Parse one SIP message from a datagram
pub fn parse_message(data: &[u8]) -> Result<Message> {
    let (head, body) = split_head(data)?;
    let head = std::str::from_utf8(head).map_err(|_| ParseError::InvalidUtf8)?;
    let lines = unfold(head);
    let (start, header_lines) = lines.split_first().ok_or(ParseError::Incomplete)?;

    let mut headers = Vec::with_capacity(header_lines.len());
    for line in header_lines {
        let (_, (name, value)) =
            header_line(line).map_err(|_| ParseError::header(line.as_str(), "malformed header line"))?;
        headers.push(Header::new(name.parse::<HeaderName>()?, value));
    }

    let body = match headers.iter().find(|h| h.name == HeaderName::ContentLength) {
        Some(h) => {
            let declared: usize = h
                .value
                .trim()
                .parse()
                .map_err(|_| ParseError::header("Content-Length", h.value.as_str()))?;
            if declared > body.len() {
                return Err(ParseError::ContentLengthMismatch {
                    declared,
                    actual: body.len(),
                });
            }
            Bytes::copy_from_slice(&body[..declared])
        }
        None => Bytes::copy_from_slice(body),
    };

    let is_response = start
        .as_bytes()
        .get(..SIP_VERSION.len())
        .map_or(false, |p| p.eq_ignore_ascii_case(SIP_VERSION.as_bytes()));
    let message = if is_response {
        let (_, (code, reason)) = status_line(start).map_err(|_| ParseError::InvalidStartLine {
            line: start.clone(),
        })?;
        let status = StatusCode::from_u16(code)?;
        Message::Response(Response {
            status,
            reason: reason.to_string(),
            headers,
            body,
        })
    } else {
        let (_, (method, uri)) = request_line(start).map_err(|_| ParseError::InvalidStartLine {
            line: start.clone(),
        })?;
        Message::Request(Request {
            method: method.parse::<Method>()?,
            uri: uri.parse()?,
            headers,
            body,
        })
    };

    validate(&message)?;
    trace!(call_id = ?message.call_id().ok(), "parsed SIP message");
    Ok(message)
}

/// Mandatory headers must be present and well-formed
fn validate(message: &Message) -> Result<()> {
    fn common<M: HeaderAccess>(m: &M) -> Result<()> {
        if m.call_id()?.trim().is_empty() {
            return Err(ParseError::header("Call-ID", "empty"));
        }
        m.cseq()?;
        m.from_addr()?;
        m.to_addr()?;
        Ok(())
    }

    match message {
        Message::Request(req) => {
            common(req)?;
            req.via()?;
            let cseq = req.cseq()?;
            if cseq.method != req.method {
                return Err(ParseError::header(
                    "CSeq",
                    format!("method {} does not match request {}", cseq.method, req.method),
                ));
            }
        }
        Message::Response(resp) => common(resp)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Method;

    const INVITE: &str = "INVITE sip:*97@pbx.example.com SIP/2.0\r\n\
        Via: SIP/2.0/UDP 10.0.0.5:5060;branch=z9hG4bK74bf9\r\n\
        Via: SIP/2.0/UDP 10.0.0.1:5060;branch=z9hG4bK1111\r\n\
        Max-Forwards: 70\r\n\
        f: \"Desk\" <sip:1001@pbx.example.com>;tag=9fxced76sl\r\n\
        t: <sip:*97@pbx.example.com>\r\n\
        i: 3848276298220188511@10.0.0.5\r\n\
        CSeq: 1 INVITE\r\n\
        Contact: <sip:1001@10.0.0.5:5060>\r\n\
        c: application/sdp\r\n\
        l: 4\r\n\
        \r\n\
        v=0\r\n";

    #[test]
    fn parses_request_with_compact_headers() {
        let msg = parse_message(INVITE.as_bytes()).unwrap();
        let Message::Request(req) = msg else {
            panic!("expected request");
        };
        assert_eq!(req.method, Method::Invite);
        assert_eq!(req.uri.user.as_deref(), Some("*97"));
        assert_eq!(req.call_id().unwrap(), "3848276298220188511@10.0.0.5");
        assert_eq!(req.from_addr().unwrap().tag(), Some("9fxced76sl"));
        assert_eq!(req.content_type(), Some("application/sdp"));
        assert_eq!(req.header_values(&HeaderName::Via).count(), 2);
        // body cut to Content-Length
        assert_eq!(&req.body[..], b"v=0\r");
    }

    #[test]
    fn parses_response() {
        let raw = "SIP/2.0 180 Ringing\r\n\
            Via: SIP/2.0/UDP 10.0.0.5:5060;branch=z9hG4bK74bf9\r\n\
            From: <sip:1001@pbx>;tag=1\r\n\
            To: <sip:2002@pbx>;tag=2\r\n\
            Call-ID: x@y\r\n\
            CSeq: 1 INVITE\r\n\r\n";
        let Message::Response(resp) = parse_message(raw.as_bytes()).unwrap() else {
            panic!("expected response");
        };
        assert_eq!(resp.status, StatusCode::Ringing);
        assert_eq!(resp.reason, "Ringing");
        assert!(resp.body.is_empty());
    }

    #[test]
    fn folded_header_is_joined() {
        let raw = "OPTIONS sip:pbx SIP/2.0\r\n\
            Via: SIP/2.0/UDP 10.0.0.5;branch=z9hG4bK1\r\n\
            From: <sip:a@pbx>;tag=1\r\n\
            To: <sip:pbx>\r\n\
            Call-ID: fold@test\r\n\
            CSeq: 7 OPTIONS\r\n\
            Subject: first\r\n\
            \tsecond\r\n\r\n";
        let Message::Request(req) = parse_message(raw.as_bytes()).unwrap() else {
            panic!("expected request");
        };
        let subject = req.header(&"Subject".parse().unwrap()).unwrap();
        assert_eq!(subject, "first second");
    }

    #[test]
    fn short_body_is_rejected() {
        let raw = INVITE.replace("l: 4", "l: 40");
        assert_eq!(
            parse_message(raw.as_bytes()),
            Err(ParseError::ContentLengthMismatch {
                declared: 40,
                actual: 5
            })
        );
    }

    #[test]
    fn missing_call_id_is_rejected() {
        let raw = INVITE.replace("i: 3848276298220188511@10.0.0.5\r\n", "");
        assert_eq!(
            parse_message(raw.as_bytes()),
            Err(ParseError::MissingHeader { name: "Call-ID" })
        );
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_message(b"hello world\r\n\r\n").is_err());
        assert!(parse_message(b"").is_err());
        assert!(parse_message(b"INVITE sip:a@b SIP/2.0\r\nVia: x").is_err());
        assert!(parse_message(&[0xff, 0xfe, b'\r', b'\n', b'\r', b'\n']).is_err());
    }

    #[test]
    fn multibyte_start_line_is_rejected() {
        // 'é' straddles the byte offset of the version prefix
        let raw = "INVITEé sip:1@x SIP/2.0\r\nCall-ID: a\r\n\r\n";
        assert!(parse_message(raw.as_bytes()).is_err());
        assert!(parse_message("SIP/2.é 200 OK\r\nCall-ID: a\r\n\r\n".as_bytes()).is_err());
        assert!(parse_message("ÉÉÉ\r\n\r\n".as_bytes()).is_err());
    }

    #[test]
    fn cseq_method_must_match() {
        let raw = INVITE.replace("CSeq: 1 INVITE", "CSeq: 1 BYE");
        assert!(matches!(
            parse_message(raw.as_bytes()),
            Err(ParseError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn serialize_then_parse_keeps_fields() {
        let msg = parse_message(INVITE.as_bytes()).unwrap();
        let again = parse_message(&msg.to_bytes()).unwrap();
        assert_eq!(msg, again);
    }
}
