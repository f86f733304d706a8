//! RTCP Sender/Receiver Report decoding and round-trip timing.
//!
//! The relay forwards RTCP untouched; it only peeks at it. An SR forwarded
//! toward a leg is remembered by the middle 32 bits of its NTP timestamp.
//! When that leg later reports back with the same LSR, the round trip from
//! the relay to that leg is `now - forwarded_at - DLSR`.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::error::{MediaError, Result};

pub const RTCP_SR: u8 = 200;
pub const RTCP_RR: u8 = 201;

const REPORT_BLOCK_LEN: usize = 24;
const SENDER_INFO_LEN: usize = 20;
const MAX_PENDING_SR: usize = 16;

/// NTP timestamp (RFC 3550)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NtpTimestamp {
    /// Seconds since January 1, 1900
    pub seconds: u32,
    /// Fraction of a second
    pub fraction: u32,
}

impl NtpTimestamp {
    /// Middle 32 bits, as echoed in a report block's LSR field
    pub fn middle32(&self) -> u32 {
        ((self.seconds & 0x0000FFFF) << 16) | ((self.fraction & 0xFFFF0000) >> 16)
    }
}

/// One reception report block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportBlock {
    pub ssrc: u32,
    pub fraction_lost: u8,
    pub cumulative_lost: u32,
    pub highest_seq: u32,
    pub jitter: u32,
    pub last_sr: u32,
    /// In units of 1/65536 s
    pub delay_since_last_sr: u32,
}

impl ReportBlock {
    fn parse(b: &[u8]) -> Self {
        let word = |i: usize| u32::from_be_bytes([b[i], b[i + 1], b[i + 2], b[i + 3]]);
        ReportBlock {
            ssrc: word(0),
            fraction_lost: b[4],
            cumulative_lost: u32::from_be_bytes([0, b[5], b[6], b[7]]),
            highest_seq: word(8),
            jitter: word(12),
            last_sr: word(16),
            delay_since_last_sr: word(20),
        }
    }
}

/// The RTCP packet types the relay cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcpPacket {
    SenderReport {
        ssrc: u32,
        ntp: NtpTimestamp,
        reports: Vec<ReportBlock>,
    },
    ReceiverReport {
        ssrc: u32,
        reports: Vec<ReportBlock>,
    },
    Other {
        packet_type: u8,
    },
}

fn report_blocks(body: &[u8], count: usize) -> Result<Vec<ReportBlock>> {
    if body.len() < count * REPORT_BLOCK_LEN {
        return Err(MediaError::invalid_packet("truncated RTCP report blocks"));
    }
    Ok(body
        .chunks_exact(REPORT_BLOCK_LEN)
        .take(count)
        .map(ReportBlock::parse)
        .collect())
}

/// Split a compound RTCP datagram into its packets
pub fn parse_compound(data: &[u8]) -> Result<Vec<RtcpPacket>> {
    let mut packets = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        if rest.len() < 8 {
            return Err(MediaError::invalid_packet("truncated RTCP header"));
        }
        if rest[0] >> 6 != 2 {
            return Err(MediaError::invalid_packet("bad RTCP version"));
        }
        let count = (rest[0] & 0x1F) as usize;
        let packet_type = rest[1];
        let len = (u16::from_be_bytes([rest[2], rest[3]]) as usize + 1) * 4;
        if len < 8 {
            return Err(MediaError::invalid_packet(format!(
                "RTCP length {} leaves no room for an SSRC",
                len
            )));
        }
        if rest.len() < len {
            return Err(MediaError::invalid_packet(format!(
                "RTCP length {} exceeds datagram {}",
                len,
                rest.len()
            )));
        }
        let packet = &rest[..len];
        let ssrc = u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]);
        let body = &packet[8..];

        packets.push(match packet_type {
            RTCP_SR => {
                if body.len() < SENDER_INFO_LEN {
                    return Err(MediaError::invalid_packet("truncated sender info"));
                }
                let ntp = NtpTimestamp {
                    seconds: u32::from_be_bytes([body[0], body[1], body[2], body[3]]),
                    fraction: u32::from_be_bytes([body[4], body[5], body[6], body[7]]),
                };
                RtcpPacket::SenderReport {
                    ssrc,
                    ntp,
                    reports: report_blocks(&body[SENDER_INFO_LEN..], count)?,
                }
            }
            RTCP_RR => RtcpPacket::ReceiverReport {
                ssrc,
                reports: report_blocks(body, count)?,
            },
            other => RtcpPacket::Other { packet_type: other },
        });
        rest = &rest[len..];
    }
    Ok(packets)
}

/// Remembers SRs forwarded toward one leg and matches that leg's reports
#[derive(Debug, Default)]
pub struct RttTracker {
    pending: VecDeque<(u32, Instant)>,
}

impl RttTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// An SR carrying `ntp` was forwarded to this leg at `at`
    pub fn note_forwarded(&mut self, ntp: NtpTimestamp, at: Instant) {
        if self.pending.len() == MAX_PENDING_SR {
            self.pending.pop_front();
        }
        self.pending.push_back((ntp.middle32(), at));
    }

    /// Round trip implied by a report block received from this leg
    pub fn on_report(&mut self, block: &ReportBlock, now: Instant) -> Option<Duration> {
        if block.last_sr == 0 {
            return None;
        }
        let idx = self.pending.iter().position(|(lsr, _)| *lsr == block.last_sr)?;
        let (_, forwarded_at) = self.pending[idx];
        // older SRs can no longer be echoed
        self.pending.drain(..idx);
        let dlsr = Duration::from_secs_f64(block.delay_since_last_sr as f64 / 65536.0);
        now.checked_duration_since(forwarded_at)?.checked_sub(dlsr)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sender_report(ssrc: u32, ntp: NtpTimestamp) -> Vec<u8> {
        let mut buf = vec![0x80, RTCP_SR, 0, 6];
        buf.extend_from_slice(&ssrc.to_be_bytes());
        buf.extend_from_slice(&ntp.seconds.to_be_bytes());
        buf.extend_from_slice(&ntp.fraction.to_be_bytes());
        buf.extend_from_slice(&[0; 12]);
        buf
    }

    pub(crate) fn receiver_report(ssrc: u32, lsr: u32, dlsr: u32) -> Vec<u8> {
        let mut buf = vec![0x81, RTCP_RR, 0, 7];
        buf.extend_from_slice(&ssrc.to_be_bytes());
        buf.extend_from_slice(&0x1111u32.to_be_bytes());
        buf.extend_from_slice(&[0; 12]);
        buf.extend_from_slice(&lsr.to_be_bytes());
        buf.extend_from_slice(&dlsr.to_be_bytes());
        buf
    }

    #[test]
    fn parses_compound_sr_rr() {
        let ntp = NtpTimestamp {
            seconds: 0x0001_2345,
            fraction: 0x6789_0000,
        };
        let mut data = sender_report(7, ntp);
        data.extend(receiver_report(9, ntp.middle32(), 65536));
        let packets = parse_compound(&data).unwrap();
        assert_eq!(packets.len(), 2);
        assert!(matches!(packets[0], RtcpPacket::SenderReport { ssrc: 7, .. }));
        match &packets[1] {
            RtcpPacket::ReceiverReport { ssrc, reports } => {
                assert_eq!(*ssrc, 9);
                assert_eq!(reports[0].last_sr, 0x2345_6789);
                assert_eq!(reports[0].delay_since_last_sr, 65536);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rejects_truncated() {
        let mut data = receiver_report(1, 2, 3);
        data.truncate(20);
        assert!(parse_compound(&data).is_err());
    }

    #[test]
    fn rejects_zero_length_field() {
        let data = [0x80, RTCP_RR, 0, 0, 0, 0, 0, 0];
        assert!(matches!(parse_compound(&data), Err(MediaError::InvalidPacket { .. })));

        // a valid packet followed by a header claiming one word
        let mut data = receiver_report(1, 2, 3);
        data.extend_from_slice(&[0x80, RTCP_SR, 0, 0, 0, 0, 0, 1]);
        assert!(parse_compound(&data).is_err());
    }

    #[test]
    fn rtt_subtracts_dlsr() {
        let mut tracker = RttTracker::new();
        let ntp = NtpTimestamp { seconds: 10, fraction: 0 };
        let sent = Instant::now();
        tracker.note_forwarded(ntp, sent);
        let block = ReportBlock {
            ssrc: 1,
            fraction_lost: 0,
            cumulative_lost: 0,
            highest_seq: 0,
            jitter: 0,
            last_sr: ntp.middle32(),
            delay_since_last_sr: 32768, // 500 ms
        };
        let rtt = tracker
            .on_report(&block, sent + Duration::from_millis(700))
            .unwrap();
        assert_eq!(rtt.as_millis(), 200);
        // unmatched LSR
        let other = ReportBlock { last_sr: 99, ..block };
        assert!(tracker.on_report(&other, sent).is_none());
    }
}
