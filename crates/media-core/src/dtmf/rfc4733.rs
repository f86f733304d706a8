//! RFC 4733 telephone-event payloads.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     event     |E|R| volume    |          duration             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Every packet of one key press carries the same RTP timestamp (the start
//! of the event) and a growing duration. The final packet has E set and is
//! sent three times.

use std::collections::VecDeque;

use bytes::Bytes;
use tracing::{debug, trace};

use super::{DtmfDigit, ToneEvent};
use crate::error::{MediaError, Result};
use crate::rtp_processing::RtpPacket;

pub const EVENT_PAYLOAD_LEN: usize = 4;
pub const END_PACKET_REPEATS: usize = 3;

const END_BIT: u8 = 0x80;
const VOLUME_MASK: u8 = 0x3F;
const RECENT_EVENTS: usize = 8;

impl ToneEvent {
    pub fn encode(&self) -> [u8; EVENT_PAYLOAD_LEN] {
        let end = if self.end { END_BIT } else { 0 };
        let flags = end | (self.volume & VOLUME_MASK);
        let [hi, lo] = self.duration.to_be_bytes();
        [self.digit.event_code(), flags, hi, lo]
    }

    /// Decode one event block. The R bit is ignored as RFC 4733 requires.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < EVENT_PAYLOAD_LEN {
            return Err(MediaError::invalid_event(format!(
                "telephone-event payload is {} bytes",
                payload.len()
            )));
        }
        let digit = DtmfDigit::from_event_code(payload[0]).ok_or_else(|| {
            MediaError::invalid_event(format!("event code {} is not a DTMF digit", payload[0]))
        })?;
        Ok(ToneEvent {
            digit,
            end: payload[1] & END_BIT != 0,
            volume: payload[1] & VOLUME_MASK,
            duration: u16::from_be_bytes([payload[2], payload[3]]),
        })
    }
}

/// Builds the RTP packet train for one key press
#[derive(Debug, Clone)]
pub struct EventEncoder {
    payload_type: u8,
    ssrc: u32,
    sequence: u16,
    clock_rate: u32,
    packet_interval_ms: u32,
    volume: u8,
}

impl EventEncoder {
    pub fn new(payload_type: u8, ssrc: u32, initial_sequence: u16) -> Self {
        Self {
            payload_type,
            ssrc,
            sequence: initial_sequence,
            clock_rate: 8000,
            packet_interval_ms: 50,
            volume: 10,
        }
    }

    pub fn with_clock_rate(mut self, clock_rate: u32) -> Self {
        self.clock_rate = clock_rate;
        self
    }

    pub fn with_volume(mut self, volume: u8) -> Self {
        self.volume = volume & VOLUME_MASK;
        self
    }

    pub fn with_packet_interval(mut self, interval_ms: u32) -> Self {
        self.packet_interval_ms = interval_ms.max(1);
        self
    }

    /// Next sequence number this encoder will use
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Packets for a press starting at `timestamp` and lasting `duration_ms`.
    ///
    /// Progress packets every packet interval, then the end packet three
    /// times. Only the first packet carries the marker bit.
    pub fn encode_press(&mut self, digit: DtmfDigit, timestamp: u32, duration_ms: u32) -> Vec<RtpPacket> {
        let samples_per_ms = (self.clock_rate / 1000).max(1);
        let total = (duration_ms.saturating_mul(samples_per_ms)).min(u16::MAX as u32) as u16;
        let step = (self.packet_interval_ms * samples_per_ms).max(1);

        let mut durations: Vec<(u16, bool)> = (1..)
            .map(|i: u32| i * step)
            .take_while(|d| *d < total as u32)
            .map(|d| (d as u16, false))
            .collect();
        durations.extend(std::iter::repeat((total, true)).take(END_PACKET_REPEATS));

        let mut packets = Vec::with_capacity(durations.len());
        for (i, (duration, end)) in durations.into_iter().enumerate() {
            let event = ToneEvent::new(digit, end, self.volume, duration);
            let packet = RtpPacket::new(
                self.payload_type,
                self.sequence,
                timestamp,
                self.ssrc,
                Bytes::copy_from_slice(&event.encode()),
            )
            .with_marker(i == 0);
            self.sequence = self.sequence.wrapping_add(1);
            packets.push(packet);
        }
        trace!(digit = %digit, packets = packets.len(), "encoded telephone-event press");
        packets
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveEvent {
    timestamp: u32,
    event: ToneEvent,
}

/// Turns a stream of telephone-event packets into one event per press
#[derive(Debug, Default)]
pub struct EventDecoder {
    current: Option<ActiveEvent>,
    finished: VecDeque<u32>,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one packet's RTP timestamp and payload.
    ///
    /// Returns the events completed by this packet: the press it ends, and
    /// possibly a previous press whose end packets were all lost.
    pub fn push(&mut self, timestamp: u32, payload: &[u8]) -> Result<Vec<ToneEvent>> {
        let event = ToneEvent::decode(payload)?;
        let mut completed = Vec::new();

        if self.finished.contains(&timestamp) {
            trace!(timestamp, "repeated end packet ignored");
            return Ok(completed);
        }

        match self.current {
            Some(mut active) if active.timestamp == timestamp => {
                active.event.duration = active.event.duration.max(event.duration);
                active.event.volume = event.volume;
                if event.end {
                    active.event.end = true;
                    completed.push(active.event);
                    self.finish(timestamp);
                } else {
                    self.current = Some(active);
                }
            }
            previous => {
                if let Some(prev) = previous {
                    debug!(digit = %prev.event.digit, "event ended without an end packet");
                    completed.push(prev.event);
                    self.finish(prev.timestamp);
                }
                if event.end {
                    completed.push(event);
                    self.finish(timestamp);
                } else {
                    self.current = Some(ActiveEvent { timestamp, event });
                }
            }
        }
        Ok(completed)
    }

    /// Emit a press that never saw its end packet, e.g. at teardown
    pub fn flush(&mut self) -> Option<ToneEvent> {
        let active = self.current.take()?;
        self.remember(active.timestamp);
        Some(active.event)
    }

    fn finish(&mut self, timestamp: u32) {
        self.current = None;
        self.remember(timestamp);
    }

    fn remember(&mut self, timestamp: u32) {
        if self.finished.len() == RECENT_EVENTS {
            self.finished.pop_front();
        }
        self.finished.push_back(timestamp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_nine_round_trip() {
        let event = ToneEvent::new(DtmfDigit::Digit9, true, 10, 160);
        let bytes = event.encode();
        assert_eq!(bytes, [9, 0x8A, 0x00, 0xA0]);
        assert_eq!(ToneEvent::decode(&bytes).unwrap(), event);
    }

    #[test]
    fn reserved_bit_is_ignored() {
        let ev = ToneEvent::decode(&[1, 0x40 | 7, 0, 80]).unwrap();
        assert!(!ev.end);
        assert_eq!(ev.volume, 7);
    }

    #[test]
    fn rejects_short_and_non_dtmf() {
        assert!(ToneEvent::decode(&[1, 2, 3]).is_err());
        assert!(ToneEvent::decode(&[32, 0, 0, 0]).is_err());
    }

    #[test]
    fn press_train_shape() {
        let mut enc = EventEncoder::new(101, 42, 100);
        let packets = enc.encode_press(DtmfDigit::Digit5, 8000, 120);
        // 400 and 800 progress, then 960 three times
        assert_eq!(packets.len(), 5);
        assert!(packets[0].header.marker);
        assert!(packets[1..].iter().all(|p| !p.header.marker));
        assert!(packets.iter().all(|p| p.header.timestamp == 8000));
        let events: Vec<ToneEvent> = packets
            .iter()
            .map(|p| ToneEvent::decode(&p.payload).unwrap())
            .collect();
        assert_eq!(events[0].duration, 400);
        assert!(events[2..].iter().all(|e| e.end && e.duration == 960));
        assert_eq!(enc.sequence(), 105);
    }

    #[test]
    fn decoder_emits_once_per_press() {
        let mut enc = EventEncoder::new(101, 1, 0);
        let mut dec = EventDecoder::new();
        let mut emitted = Vec::new();
        for ts in [0u32, 2000] {
            for p in enc.encode_press(DtmfDigit::Pound, ts, 200) {
                emitted.extend(dec.push(p.header.timestamp, &p.payload).unwrap());
            }
        }
        assert_eq!(emitted.len(), 2);
        assert!(emitted.iter().all(|e| e.digit == DtmfDigit::Pound && e.end));
        assert_eq!(emitted[0].duration, 1600);
    }

    #[test]
    fn lost_end_packets_are_recovered_by_next_press() {
        let mut dec = EventDecoder::new();
        let start = ToneEvent::new(DtmfDigit::Digit1, false, 10, 400).encode();
        assert!(dec.push(100, &start).unwrap().is_empty());
        let next = ToneEvent::new(DtmfDigit::Digit2, false, 10, 400).encode();
        let out = dec.push(900, &next).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].digit, DtmfDigit::Digit1);
        assert!(!out[0].end);
        assert_eq!(dec.flush().map(|e| e.digit), Some(DtmfDigit::Digit2));
        assert!(dec.flush().is_none());
    }

    #[test]
    fn end_only_press_is_emitted() {
        let mut dec = EventDecoder::new();
        let end = ToneEvent::new(DtmfDigit::Star, true, 10, 800).encode();
        assert_eq!(dec.push(5, &end).unwrap().len(), 1);
        assert!(dec.push(5, &end).unwrap().is_empty());
    }
}
