//! RTP fixed header decoding (RFC 3550 Section 5.1).

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{MediaError, Result};

pub const RTP_VERSION: u8 = 2;
pub const RTP_HEADER_LEN: usize = 12;

/// RTP header fields the relay inspects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
}

/// A decoded RTP packet; `payload` excludes CSRCs, extension and padding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    pub header: RtpHeader,
    pub payload: Bytes,
}

impl RtpPacket {
    pub fn new(payload_type: u8, sequence_number: u16, timestamp: u32, ssrc: u32, payload: Bytes) -> Self {
        RtpPacket {
            header: RtpHeader {
                marker: false,
                payload_type,
                sequence_number,
                timestamp,
                ssrc,
                csrc: Vec::new(),
            },
            payload,
        }
    }

    pub fn with_marker(mut self, marker: bool) -> Self {
        self.header.marker = marker;
        self
    }

    /// Decode a datagram
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < RTP_HEADER_LEN {
            return Err(MediaError::invalid_packet(format!(
                "RTP packet too short: {} bytes",
                data.len()
            )));
        }
        let version = data[0] >> 6;
        if version != RTP_VERSION {
            return Err(MediaError::invalid_packet(format!("RTP version {}", version)));
        }
        let padding = data[0] & 0x20 != 0;
        let extension = data[0] & 0x10 != 0;
        let csrc_count = (data[0] & 0x0F) as usize;

        let mut offset = RTP_HEADER_LEN + csrc_count * 4;
        if data.len() < offset {
            return Err(MediaError::invalid_packet("truncated CSRC list"));
        }
        let csrc = data[RTP_HEADER_LEN..offset]
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        if extension {
            if data.len() < offset + 4 {
                return Err(MediaError::invalid_packet("truncated header extension"));
            }
            let words = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
            offset += 4 + words * 4;
            if data.len() < offset {
                return Err(MediaError::invalid_packet("truncated header extension body"));
            }
        }

        let mut end = data.len();
        if padding {
            let pad = data[end - 1] as usize;
            if pad == 0 || pad > end - offset {
                return Err(MediaError::invalid_packet(format!("bad padding length {}", pad)));
            }
            end -= pad;
        }

        Ok(RtpPacket {
            header: RtpHeader {
                marker: data[1] & 0x80 != 0,
                payload_type: data[1] & 0x7F,
                sequence_number: u16::from_be_bytes([data[2], data[3]]),
                timestamp: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
                ssrc: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
                csrc,
            },
            payload: Bytes::copy_from_slice(&data[offset..end]),
        })
    }

    /// Encode without extension or padding
    pub fn serialize(&self) -> Bytes {
        let h = &self.header;
        let mut buf = BytesMut::with_capacity(RTP_HEADER_LEN + h.csrc.len() * 4 + self.payload.len());
        buf.put_u8((RTP_VERSION << 6) | (h.csrc.len() as u8 & 0x0F));
        buf.put_u8(((h.marker as u8) << 7) | (h.payload_type & 0x7F));
        buf.put_u16(h.sequence_number);
        buf.put_u32(h.timestamp);
        buf.put_u32(h.ssrc);
        for c in &h.csrc {
            buf.put_u32(*c);
        }
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

/// RTCP multiplexed on the RTP port (RFC 5761): packet types 200..=204
pub fn is_rtcp(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] >> 6 == RTP_VERSION && (200..=204).contains(&data[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_serialized_packet() {
        let pkt = RtpPacket::new(0, 1000, 160, 0xDEADBEEF, Bytes::from_static(&[1, 2, 3])).with_marker(true);
        let parsed = RtpPacket::parse(&pkt.serialize()).unwrap();
        assert_eq!(parsed, pkt);
    }

    #[test]
    fn skips_csrc_extension_and_padding() {
        let mut raw = vec![0xB1, 8, 0, 5, 0, 0, 0, 10, 0, 0, 0, 1];
        raw.extend_from_slice(&[0, 0, 0, 9]); // one CSRC
        raw.extend_from_slice(&[0xBE, 0xDE, 0, 1, 1, 2, 3, 4]); // one-word extension
        raw.extend_from_slice(&[0xAA, 0xBB]); // payload
        raw.extend_from_slice(&[0, 0, 3]); // three bytes of padding
        let pkt = RtpPacket::parse(&raw).unwrap();
        assert_eq!(pkt.header.payload_type, 8);
        assert_eq!(pkt.header.csrc, vec![9]);
        assert_eq!(&pkt.payload[..], &[0xAA, 0xBB]);
    }

    #[test]
    fn rejects_short_and_wrong_version() {
        assert!(RtpPacket::parse(&[0x80, 0, 0]).is_err());
        assert!(RtpPacket::parse(&[0x40; 12]).is_err());
    }

    #[test]
    fn rtcp_detection() {
        assert!(is_rtcp(&[0x81, 200, 0, 6]));
        assert!(is_rtcp(&[0x80, 201, 0, 1]));
        assert!(!is_rtcp(&[0x80, 0, 0, 1]));
        assert!(!is_rtcp(&[0x80, 101, 0, 1]));
    }
}
