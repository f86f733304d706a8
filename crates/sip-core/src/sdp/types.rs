use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

/// Encoding name used for RFC 4733 telephone events
pub const TELEPHONE_EVENT: &str = "telephone-event";

/// RFC 3551 static audio payload types the switchboard knows by number
pub fn static_payload(pt: u8) -> Option<(&'static str, u32)> {
    match pt {
        0 => Some(("PCMU", 8000)),
        3 => Some(("GSM", 8000)),
        4 => Some(("G723", 8000)),
        8 => Some(("PCMA", 8000)),
        9 => Some(("G722", 8000)),
        18 => Some(("G729", 8000)),
        _ => None,
    }
}

/// `o=` line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub username: String,
    pub session_id: u64,
    pub session_version: u64,
    pub address: IpAddr,
}

/// `c=IN IP4 <addr>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub address: IpAddr,
}

/// `a=rtpmap:<pt> <encoding>/<clock>[/<channels>]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtpMap {
    pub payload_type: u8,
    pub encoding: String,
    pub clock_rate: u32,
    pub channels: Option<u8>,
}

impl RtpMap {
    pub fn new(payload_type: u8, encoding: impl Into<String>, clock_rate: u32) -> Self {
        RtpMap {
            payload_type,
            encoding: encoding.into(),
            clock_rate,
            channels: None,
        }
    }

    pub fn is_telephone_event(&self) -> bool {
        self.encoding.eq_ignore_ascii_case(TELEPHONE_EVENT)
    }
}

/// `a=fmtp:<pt> <params>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fmtp {
    pub payload_type: u8,
    pub params: String,
}

/// Stream direction attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::SendRecv => "sendrecv",
            Direction::SendOnly => "sendonly",
            Direction::RecvOnly => "recvonly",
            Direction::Inactive => "inactive",
        }
    }

    pub(crate) fn from_attr(name: &str) -> Option<Self> {
        match name {
            "sendrecv" => Some(Direction::SendRecv),
            "sendonly" => Some(Direction::SendOnly),
            "recvonly" => Some(Direction::RecvOnly),
            "inactive" => Some(Direction::Inactive),
            _ => None,
        }
    }
}

/// Any `a=` line not modelled explicitly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: Option<String>,
}

/// One `m=` block with its attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDescription {
    pub media: String,
    pub port: u16,
    pub protocol: String,
    /// Payload types in the order the offerer listed them
    pub formats: Vec<u8>,
    pub connection: Option<Connection>,
    pub rtpmaps: Vec<RtpMap>,
    pub fmtps: Vec<Fmtp>,
    pub ptime: Option<u32>,
    pub direction: Option<Direction>,
    pub attributes: Vec<Attribute>,
}

impl MediaDescription {
    pub fn audio(port: u16, formats: Vec<u8>) -> Self {
        MediaDescription {
            media: "audio".to_string(),
            port,
            protocol: "RTP/AVP".to_string(),
            formats,
            connection: None,
            rtpmaps: Vec::new(),
            fmtps: Vec::new(),
            ptime: None,
            direction: None,
            attributes: Vec::new(),
        }
    }

    pub fn rtpmap(&self, pt: u8) -> Option<&RtpMap> {
        self.rtpmaps.iter().find(|m| m.payload_type == pt)
    }

    pub fn fmtp(&self, pt: u8) -> Option<&Fmtp> {
        self.fmtps.iter().find(|f| f.payload_type == pt)
    }

    /// Encoding name and clock rate, falling back to the static table
    pub fn codec(&self, pt: u8) -> Option<(String, u32)> {
        self.rtpmap(pt)
            .map(|m| (m.encoding.clone(), m.clock_rate))
            .or_else(|| static_payload(pt).map(|(n, c)| (n.to_string(), c)))
    }

    /// Payload type of the first `telephone-event` rtpmap among the formats
    pub fn telephone_event(&self) -> Option<u8> {
        self.formats
            .iter()
            .copied()
            .find(|pt| self.rtpmap(*pt).map_or(false, RtpMap::is_telephone_event))
    }
}

/// A parsed or generated session description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub origin: Origin,
    pub session_name: String,
    pub connection: Option<Connection>,
    pub media: Vec<MediaDescription>,
}

impl SessionDescription {
    /// First audio stream
    pub fn audio(&self) -> Option<&MediaDescription> {
        self.media.iter().find(|m| m.media.eq_ignore_ascii_case("audio"))
    }

    /// Offered codec list of the first audio stream (empty when absent)
    pub fn audio_codecs(&self) -> Vec<u8> {
        self.audio().map(|m| m.formats.clone()).unwrap_or_default()
    }

    /// Media-level connection wins over session-level
    pub fn audio_endpoint(&self) -> Option<SocketAddr> {
        let audio = self.audio()?;
        let conn = audio.connection.or(self.connection)?;
        Some(SocketAddr::new(conn.address, audio.port))
    }

    pub fn telephone_event(&self) -> Option<u8> {
        self.audio().and_then(MediaDescription::telephone_event)
    }
}

fn addr_type(addr: &IpAddr) -> &'static str {
    match addr {
        IpAddr::V4(_) => "IP4",
        IpAddr::V6(_) => "IP6",
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c=IN {} {}\r\n", addr_type(&self.address), self.address)
    }
}

impl fmt::Display for MediaDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m={} {} {}", self.media, self.port, self.protocol)?;
        for pt in &self.formats {
            write!(f, " {}", pt)?;
        }
        f.write_str("\r\n")?;
        if let Some(conn) = &self.connection {
            write!(f, "{}", conn)?;
        }
        for map in &self.rtpmaps {
            write!(f, "a=rtpmap:{} {}/{}", map.payload_type, map.encoding, map.clock_rate)?;
            if let Some(ch) = map.channels {
                write!(f, "/{}", ch)?;
            }
            f.write_str("\r\n")?;
        }
        for fmtp in &self.fmtps {
            write!(f, "a=fmtp:{} {}\r\n", fmtp.payload_type, fmtp.params)?;
        }
        if let Some(ptime) = self.ptime {
            write!(f, "a=ptime:{}\r\n", ptime)?;
        }
        for attr in &self.attributes {
            match &attr.value {
                Some(v) => write!(f, "a={}:{}\r\n", attr.name, v)?,
                None => write!(f, "a={}\r\n", attr.name)?,
            }
        }
        if let Some(dir) = self.direction {
            write!(f, "a={}\r\n", dir.as_str())?;
        }
        Ok(())
    }
}

impl fmt::Display for SessionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("v=0\r\n")?;
        write!(
            f,
            "o={} {} {} IN {} {}\r\n",
            self.origin.username,
            self.origin.session_id,
            self.origin.session_version,
            addr_type(&self.origin.address),
            self.origin.address
        )?;
        write!(f, "s={}\r\n", self.session_name)?;
        if let Some(conn) = &self.connection {
            write!(f, "{}", conn)?;
        }
        f.write_str("t=0 0\r\n")?;
        for media in &self.media {
            write!(f, "{}", media)?;
        }
        Ok(())
    }
}
