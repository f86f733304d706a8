//! SDP parsing (RFC 8866 subset used by audio calls).
//!
//! Each line has the form `<type>=<value>`; the line grammar is handled by
//! [`parse_sdp_line`] and the typed fields are filled in line by line.

use std::net::{IpAddr, Ipv4Addr};

use nom::{
    character::complete::{anychar, char, not_line_ending},
    IResult,
};

use crate::error::{ParseError, Result};
use crate::sdp::types::{
    Attribute, Connection, Direction, Fmtp, MediaDescription, Origin, RtpMap, SessionDescription,
};

/// Parse an SDP line into a key-value pair
///
/// ```
/// use switchboard_sip_core::sdp::parser::parse_sdp_line;
///
/// let (_, (key, value)) = parse_sdp_line("a=rtpmap:101 telephone-event/8000").unwrap();
/// assert_eq!(key, 'a');
/// assert_eq!(value, "rtpmap:101 telephone-event/8000");
/// ```
pub fn parse_sdp_line(input: &str) -> IResult<&str, (char, &str)> {
    let (input, key) = anychar(input)?;
    let (input, _) = char('=')(input)?;
    let (input, value) = not_line_ending(input)?;

    // Handle different line endings (CRLF, LF, etc.)
    let input = input.trim_start_matches(['\r', '\n']);

    Ok((input, (key, value.trim())))
}

fn parse_connection(value: &str) -> Result<Connection> {
    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some("IN"), Some("IP4" | "IP6"), Some(addr)) => {
            // strip multicast TTL / address count
            let addr = addr.split('/').next().unwrap_or(addr);
            let address = addr
                .parse::<IpAddr>()
                .map_err(|_| ParseError::sdp(format!("bad connection address {}", addr)))?;
            Ok(Connection { address })
        }
        _ => Err(ParseError::sdp(format!("bad connection line c={}", value))),
    }
}

fn parse_origin(value: &str) -> Result<Origin> {
    let fields: Vec<&str> = value.split_whitespace().collect();
    if fields.len() != 6 {
        return Err(ParseError::sdp(format!("bad origin line o={}", value)));
    }
    let number = |s: &str| {
        s.parse::<u64>()
            .map_err(|_| ParseError::sdp(format!("bad origin number {}", s)))
    };
    Ok(Origin {
        username: fields[0].to_string(),
        session_id: number(fields[1])?,
        session_version: number(fields[2])?,
        // Some endpoints put a hostname here; it is informational only
        address: fields[5].parse().unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
    })
}

fn parse_media(value: &str) -> Result<MediaDescription> {
    let mut parts = value.split_whitespace();
    let (media, port, protocol) = match (parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(p), Some(proto)) => (m, p, proto),
        _ => return Err(ParseError::sdp(format!("bad media line m={}", value))),
    };
    // port may carry a "/<count>" suffix
    let port = port
        .split('/')
        .next()
        .and_then(|p| p.parse::<u16>().ok())
        .ok_or_else(|| ParseError::sdp(format!("bad media port in m={}", value)))?;

    let is_rtp = protocol.contains("RTP");
    let mut formats = Vec::new();
    for fmt in parts {
        match fmt.parse::<u8>() {
            Ok(pt) if pt < 128 => formats.push(pt),
            _ if is_rtp => {
                return Err(ParseError::sdp(format!("bad payload type {} in m={}", fmt, value)))
            }
            _ => {}
        }
    }

    let mut desc = MediaDescription::audio(port, formats);
    desc.media = media.to_string();
    desc.protocol = protocol.to_string();
    Ok(desc)
}

fn parse_rtpmap(value: &str) -> Result<RtpMap> {
    let bad = || ParseError::sdp(format!("bad rtpmap {}", value));
    let (pt, encoding) = value.split_once(' ').ok_or_else(bad)?;
    let mut enc = encoding.trim().split('/');
    let name = enc.next().filter(|n| !n.is_empty()).ok_or_else(bad)?;
    let clock_rate = enc.next().and_then(|c| c.parse::<u32>().ok()).ok_or_else(bad)?;
    let channels = match enc.next() {
        Some(ch) => Some(ch.parse::<u8>().map_err(|_| bad())?),
        None => None,
    };
    Ok(RtpMap {
        payload_type: pt.trim().parse().map_err(|_| bad())?,
        encoding: name.to_string(),
        clock_rate,
        channels,
    })
}

fn parse_fmtp(value: &str) -> Result<Fmtp> {
    let (pt, params) = value
        .split_once(' ')
        .ok_or_else(|| ParseError::sdp(format!("bad fmtp {}", value)))?;
    Ok(Fmtp {
        payload_type: pt
            .trim()
            .parse()
            .map_err(|_| ParseError::sdp(format!("bad fmtp payload type {}", pt)))?,
        params: params.trim().to_string(),
    })
}

fn apply_attribute(media: &mut MediaDescription, value: &str) -> Result<()> {
    let (name, arg) = match value.split_once(':') {
        Some((n, a)) => (n, Some(a)),
        None => (value, None),
    };
    match (name, arg) {
        ("rtpmap", Some(a)) => media.rtpmaps.push(parse_rtpmap(a)?),
        ("fmtp", Some(a)) => media.fmtps.push(parse_fmtp(a)?),
        ("ptime", Some(a)) => {
            media.ptime = Some(
                a.trim()
                    .parse()
                    .map_err(|_| ParseError::sdp(format!("bad ptime {}", a)))?,
            )
        }
        (n, None) if Direction::from_attr(n).is_some() => media.direction = Direction::from_attr(n),
        (n, a) => media.attributes.push(Attribute {
            name: n.to_string(),
            value: a.map(str::to_string),
        }),
    }
    Ok(())
}

/// Parse a complete SDP body
pub fn parse_sdp(body: &str) -> Result<SessionDescription> {
    let mut input = body.trim_start();
    let mut version_seen = false;
    let mut origin = None;
    let mut session_name = String::new();
    let mut connection = None;
    let mut media: Vec<MediaDescription> = Vec::new();

    while !input.is_empty() {
        let (rest, (key, value)) = parse_sdp_line(input)
            .map_err(|_| ParseError::sdp(format!("malformed line near {:?}", input.lines().next())))?;
        input = rest;

        if key == 'm' {
            media.push(parse_media(value)?);
            continue;
        }
        match (key, media.last_mut()) {
            ('v', _) => {
                if value != "0" {
                    return Err(ParseError::sdp(format!("unsupported version {}", value)));
                }
                version_seen = true;
            }
            ('o', None) => origin = Some(parse_origin(value)?),
            ('s', None) => session_name = value.to_string(),
            ('c', None) => connection = Some(parse_connection(value)?),
            ('c', Some(m)) => m.connection = Some(parse_connection(value)?),
            ('a', Some(m)) => apply_attribute(m, value)?,
            // session-level attributes and the remaining line types are not needed
            _ => {}
        }
    }

    if !version_seen {
        return Err(ParseError::sdp("missing v= line"));
    }
    let origin = origin.ok_or_else(|| ParseError::sdp("missing o= line"))?;

    Ok(SessionDescription {
        origin,
        session_name,
        connection,
        media,
    })
}

impl std::str::FromStr for SessionDescription {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self> {
        parse_sdp(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFER: &str = "v=0\r\n\
        o=phone 2890844526 2890844526 IN IP4 192.0.2.10\r\n\
        s=-\r\n\
        c=IN IP4 192.0.2.10\r\n\
        t=0 0\r\n\
        m=audio 49170 RTP/AVP 8 9 0 101\r\n\
        a=rtpmap:8 PCMA/8000\r\n\
        a=rtpmap:9 G722/8000\r\n\
        a=rtpmap:0 PCMU/8000\r\n\
        a=rtpmap:101 telephone-event/8000\r\n\
        a=fmtp:101 0-16\r\n\
        a=ptime:20\r\n\
        a=sendrecv\r\n";

    #[test]
    fn parses_offer_in_order() {
        let sdp = parse_sdp(OFFER).unwrap();
        assert_eq!(sdp.audio_codecs(), vec![8, 9, 0, 101]);
        assert_eq!(sdp.telephone_event(), Some(101));
        assert_eq!(sdp.audio_endpoint().unwrap().to_string(), "192.0.2.10:49170");
        let audio = sdp.audio().unwrap();
        assert_eq!(audio.ptime, Some(20));
        assert_eq!(audio.direction, Some(Direction::SendRecv));
        assert_eq!(audio.fmtp(101).unwrap().params, "0-16");
        assert_eq!(audio.codec(0), Some(("PCMU".to_string(), 8000)));
    }

    #[test]
    fn static_types_without_rtpmap() {
        let sdp = parse_sdp(
            "v=0\no=- 1 1 IN IP4 10.0.0.1\ns=-\nc=IN IP4 10.0.0.1\nt=0 0\nm=audio 4000 RTP/AVP 0 18\n",
        )
        .unwrap();
        let audio = sdp.audio().unwrap();
        assert_eq!(audio.codec(18), Some(("G729".to_string(), 8000)));
        assert_eq!(sdp.telephone_event(), None);
    }

    #[test]
    fn media_connection_overrides_session() {
        let body = OFFER.replace("a=ptime:20\r\n", "c=IN IP4 198.51.100.7\r\n");
        let sdp = parse_sdp(&body).unwrap();
        assert_eq!(sdp.audio_endpoint().unwrap().to_string(), "198.51.100.7:49170");
    }

    #[test]
    fn rejects_malformed_bodies() {
        assert!(parse_sdp("").is_err());
        assert!(parse_sdp("garbage").is_err());
        assert!(parse_sdp(&OFFER.replace("IN IP4 192.0.2.10\r\nt=", "IN IP4 nowhere\r\nt=")).is_err());
        assert!(parse_sdp(&OFFER.replace("101\r\n", "abc\r\n")).is_err());
    }

    #[test]
    fn display_round_trips() {
        let sdp = parse_sdp(OFFER).unwrap();
        let again = parse_sdp(&sdp.to_string()).unwrap();
        assert_eq!(sdp, again);
    }
}
