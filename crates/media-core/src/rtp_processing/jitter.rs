//! Playout jitter buffer.
//!
//! Packets are keyed by extended sequence number and released in sequence
//! order once their scheduled playout time has passed, or earlier when more
//! than `depth_frames` packets are waiting. A packet arriving after a later
//! one has already been released is dropped and reported as late; the
//! consumer never sees audio out of order.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::packet::RtpPacket;

/// Jitter buffer configuration
#[derive(Debug, Clone)]
pub struct JitterBufferConfig {
    /// Frames held back before release
    pub depth_frames: usize,
    /// Duration of one frame (packetization interval)
    pub frame_duration: Duration,
    /// Clock rate in Hz
    pub clock_rate: u32,
}

impl Default for JitterBufferConfig {
    fn default() -> Self {
        Self {
            depth_frames: 3,
            frame_duration: Duration::from_millis(20),
            clock_rate: 8000,
        }
    }
}

/// A buffered packet with its playout schedule
#[derive(Debug, Clone)]
pub struct JitterBufferEntry {
    pub extended_sequence: u64,
    pub arrival: Instant,
    pub playout_at: Instant,
    pub packet: RtpPacket,
}

/// What happened to a pushed packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Buffered,
    /// Arrived after its slot was released; dropped
    Late,
    Duplicate,
}

/// Jitter buffer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JitterBufferStats {
    /// Number of packets currently buffered
    pub buffered_packets: usize,
    pub released_packets: u64,
    pub late_packets: u64,
    pub duplicate_packets: u64,
    /// Sequence slots skipped at release because the packet never came
    pub skipped_packets: u64,
    pub max_buffered: usize,
}

pub struct JitterBuffer {
    config: JitterBufferConfig,
    entries: BTreeMap<u64, JitterBufferEntry>,
    highest: Option<(u16, u64)>,
    next_release: Option<u64>,
    base: Option<(Instant, u32)>,
    stats: JitterBufferStats,
}

impl JitterBuffer {
    pub fn new(config: JitterBufferConfig) -> Self {
        Self {
            config,
            entries: BTreeMap::new(),
            highest: None,
            next_release: None,
            base: None,
            stats: JitterBufferStats::default(),
        }
    }

    fn extend(&mut self, seq: u16) -> u64 {
        match self.highest {
            None => {
                // offset by one cycle so early reordering cannot underflow
                let ext = (1u64 << 16) + seq as u64;
                self.highest = Some((seq, ext));
                ext
            }
            Some((last, last_ext)) => {
                let delta = seq.wrapping_sub(last) as i16 as i64;
                let ext = (last_ext as i64 + delta).max(0) as u64;
                if delta > 0 {
                    self.highest = Some((seq, ext));
                }
                ext
            }
        }
    }

    fn playout_time(&mut self, timestamp: u32, arrival: Instant) -> Instant {
        let (base_arrival, base_ts) = *self.base.get_or_insert((arrival, timestamp));
        let delay = self.config.frame_duration * self.config.depth_frames as u32;
        let offset_ts = timestamp.wrapping_sub(base_ts) as i32;
        if offset_ts <= 0 {
            return base_arrival + delay;
        }
        let offset = Duration::from_secs_f64(offset_ts as f64 / self.config.clock_rate.max(1) as f64);
        base_arrival + offset + delay
    }

    /// Insert a packet
    pub fn push(&mut self, packet: RtpPacket, arrival: Instant) -> PushOutcome {
        let ext = self.extend(packet.header.sequence_number);
        if matches!(self.next_release, Some(next) if ext < next) {
            self.stats.late_packets += 1;
            trace!(seq = packet.header.sequence_number, "late packet dropped");
            return PushOutcome::Late;
        }
        if self.entries.contains_key(&ext) {
            self.stats.duplicate_packets += 1;
            return PushOutcome::Duplicate;
        }
        let playout_at = self.playout_time(packet.header.timestamp, arrival);
        self.entries.insert(
            ext,
            JitterBufferEntry {
                extended_sequence: ext,
                arrival,
                playout_at,
                packet,
            },
        );
        self.stats.buffered_packets = self.entries.len();
        self.stats.max_buffered = self.stats.max_buffered.max(self.entries.len());
        PushOutcome::Buffered
    }

    /// Release every packet that is due at `now`, in sequence order
    pub fn pop_ready(&mut self, now: Instant) -> Vec<JitterBufferEntry> {
        let mut out = Vec::new();
        while let Some((&ext, entry)) = self.entries.iter().next() {
            let overfull = self.entries.len() > self.config.depth_frames;
            if entry.playout_at > now && !overfull {
                break;
            }
            if let Some(entry) = self.entries.remove(&ext) {
                self.release(entry, &mut out);
            }
        }
        self.stats.buffered_packets = self.entries.len();
        out
    }

    /// Release everything regardless of schedule
    pub fn drain(&mut self) -> Vec<JitterBufferEntry> {
        let mut out = Vec::with_capacity(self.entries.len());
        let entries = std::mem::take(&mut self.entries);
        for (_, entry) in entries {
            self.release(entry, &mut out);
        }
        self.stats.buffered_packets = 0;
        out
    }

    fn release(&mut self, entry: JitterBufferEntry, out: &mut Vec<JitterBufferEntry>) {
        if let Some(next) = self.next_release {
            self.stats.skipped_packets += entry.extended_sequence.saturating_sub(next);
        }
        self.next_release = Some(entry.extended_sequence + 1);
        self.stats.released_packets += 1;
        out.push(entry);
    }

    /// Forget sequence/timing state, e.g. after an SSRC change
    pub fn reset(&mut self) {
        self.entries.clear();
        self.highest = None;
        self.next_release = None;
        self.base = None;
        self.stats.buffered_packets = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get buffer statistics
    pub fn stats(&self) -> &JitterBufferStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn pkt(seq: u16) -> RtpPacket {
        RtpPacket::new(0, seq, seq as u32 * 160, 1, Bytes::from_static(&[0xFF; 160]))
    }

    fn seqs(entries: &[JitterBufferEntry]) -> Vec<u16> {
        entries.iter().map(|e| e.packet.header.sequence_number).collect()
    }

    #[test]
    fn reorders_within_depth() {
        let mut jb = JitterBuffer::new(JitterBufferConfig::default());
        let t0 = Instant::now();
        for (i, seq) in [10u16, 12, 11, 13].into_iter().enumerate() {
            assert_eq!(jb.push(pkt(seq), t0 + Duration::from_millis(20 * i as u64)), PushOutcome::Buffered);
        }
        let out = jb.pop_ready(t0 + Duration::from_secs(1));
        assert_eq!(seqs(&out), vec![10, 11, 12, 13]);
        assert_eq!(jb.stats().skipped_packets, 0);
    }

    #[test]
    fn holds_until_playout_time() {
        let mut jb = JitterBuffer::new(JitterBufferConfig::default());
        let t0 = Instant::now();
        jb.push(pkt(1), t0);
        // 3 frames * 20 ms of delay
        assert!(jb.pop_ready(t0 + Duration::from_millis(59)).is_empty());
        assert_eq!(seqs(&jb.pop_ready(t0 + Duration::from_millis(60))), vec![1]);
    }

    #[test]
    fn overfull_releases_early() {
        let mut jb = JitterBuffer::new(JitterBufferConfig::default());
        let t0 = Instant::now();
        for seq in 1..=5u16 {
            jb.push(pkt(seq), t0);
        }
        let out = jb.pop_ready(t0);
        assert_eq!(seqs(&out), vec![1, 2]);
        assert_eq!(jb.len(), 3);
    }

    #[test]
    fn late_packet_is_dropped_not_delivered() {
        let mut jb = JitterBuffer::new(JitterBufferConfig::default());
        let t0 = Instant::now();
        jb.push(pkt(100), t0);
        jb.push(pkt(102), t0);
        let out = jb.pop_ready(t0 + Duration::from_secs(1));
        assert_eq!(seqs(&out), vec![100, 102]);
        assert_eq!(jb.stats().skipped_packets, 1);
        assert_eq!(jb.push(pkt(101), t0 + Duration::from_secs(1)), PushOutcome::Late);
        assert_eq!(jb.stats().late_packets, 1);
        assert!(jb.drain().is_empty());
    }

    #[test]
    fn sequence_wrap_keeps_order() {
        let mut jb = JitterBuffer::new(JitterBufferConfig::default());
        let t0 = Instant::now();
        for seq in [65534u16, 0, 65535, 1] {
            jb.push(pkt(seq), t0);
        }
        assert_eq!(seqs(&jb.drain()), vec![65534, 65535, 0, 1]);
    }

    #[test]
    fn duplicates_are_counted() {
        let mut jb = JitterBuffer::new(JitterBufferConfig::default());
        let t0 = Instant::now();
        jb.push(pkt(5), t0);
        assert_eq!(jb.push(pkt(5), t0), PushOutcome::Duplicate);
        assert_eq!(jb.stats().duplicate_packets, 1);
    }
}
