//! Per-direction packet accounting.
//!
//! One [`QualityMonitor`] watches the packets arriving from one leg. Its
//! sequence tracking never sees the other direction's stream, so two
//! unrelated sequence spaces cannot produce phantom loss.

use std::collections::VecDeque;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::mos::{calculate_mos, QualityBand};
use crate::relay::LegSide;
use crate::rtp_processing::RtpHeader;

/// Sequence jumps larger than this are treated as a stream restart
pub const MAX_SEQUENCE_JUMP: i32 = 3000;

/// Bounded window of recent samples with a running average and peak
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<f64>,
    capacity: usize,
    sum: f64,
    peak: f64,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            sum: 0.0,
            peak: 0.0,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            if let Some(old) = self.samples.pop_front() {
                self.sum -= old;
            }
        }
        self.samples.push_back(value);
        self.sum += value;
        self.peak = self.peak.max(value);
    }

    /// Mean of the samples currently in the window
    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            (self.sum / self.samples.len() as f64).max(0.0)
        }
    }

    /// Largest sample seen since creation
    pub fn peak(&self) -> f64 {
        self.peak
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Point-in-time view of one direction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_lost: u64,
    pub packets_out_of_order: u64,
    /// Dropped by the jitter buffer for arriving after their slot
    pub packets_late: u64,
    pub bytes_received: u64,
    pub loss_percent: f64,
    pub jitter_ms: f64,
    pub max_jitter_ms: f64,
    pub latency_ms: f64,
    pub max_latency_ms: f64,
    pub mos: f64,
}

impl QualityMetrics {
    pub fn band(&self) -> QualityBand {
        QualityBand::from_mos(self.mos)
    }
}

/// Finalized record of one direction of one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitySummary {
    pub call_id: String,
    pub leg: LegSide,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub metrics: QualityMetrics,
    pub band: QualityBand,
}

#[derive(Debug, Clone, Copy)]
struct Transit {
    arrival: Instant,
    timestamp: u32,
}

/// Counters and samples for packets arriving from one leg
#[derive(Debug)]
pub struct QualityMonitor {
    call_id: String,
    leg: LegSide,
    clock_rate: u32,
    started_at: DateTime<Utc>,

    packets_sent: u64,
    packets_received: u64,
    received_in_sequence: u64,
    packets_lost: u64,
    packets_out_of_order: u64,
    packets_late: u64,
    bytes_received: u64,

    ssrc: Option<u32>,
    expected_seq: Option<u16>,
    last_transit: Option<Transit>,
    /// RFC 3550 interarrival jitter in timestamp units
    jitter: f64,

    jitter_samples: SampleWindow,
    latency_samples: SampleWindow,
}

impl QualityMonitor {
    pub fn new(call_id: impl Into<String>, leg: LegSide, clock_rate: u32, window: usize) -> Self {
        Self {
            call_id: call_id.into(),
            leg,
            clock_rate: clock_rate.max(1),
            started_at: Utc::now(),
            packets_sent: 0,
            packets_received: 0,
            received_in_sequence: 0,
            packets_lost: 0,
            packets_out_of_order: 0,
            packets_late: 0,
            bytes_received: 0,
            ssrc: None,
            expected_seq: None,
            last_transit: None,
            jitter: 0.0,
            jitter_samples: SampleWindow::new(window),
            latency_samples: SampleWindow::new(window),
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn leg(&self) -> LegSide {
        self.leg
    }

    /// Account for one RTP packet received from this leg
    pub fn record_received(&mut self, header: &RtpHeader, size: usize, arrival: Instant) {
        self.count_received(header, size);
        self.track_jitter(header.timestamp, arrival);
    }

    /// Account for a telephone-event packet.
    ///
    /// Counts toward sequence and loss only. Every packet of a press carries
    /// the press's start timestamp, so it says nothing about transit time.
    pub fn record_received_event(&mut self, header: &RtpHeader, size: usize) {
        self.count_received(header, size);
    }

    fn count_received(&mut self, header: &RtpHeader, size: usize) {
        self.packets_received += 1;
        self.bytes_received += size as u64;

        if self.ssrc != Some(header.ssrc) {
            if self.ssrc.is_some() {
                debug!(call_id = %self.call_id, leg = %self.leg, ssrc = header.ssrc, "SSRC changed, resyncing");
            }
            self.ssrc = Some(header.ssrc);
            self.reset_sequence();
        }

        self.track_sequence(header.sequence_number);
    }

    fn track_sequence(&mut self, seq: u16) {
        let Some(expected) = self.expected_seq else {
            self.expected_seq = Some(seq.wrapping_add(1));
            self.received_in_sequence += 1;
            return;
        };
        let delta = seq.wrapping_sub(expected) as i16 as i32;
        if delta.abs() > MAX_SEQUENCE_JUMP {
            debug!(call_id = %self.call_id, leg = %self.leg, seq, expected, "sequence jump, resyncing");
            self.expected_seq = Some(seq.wrapping_add(1));
            self.received_in_sequence += 1;
        } else if delta >= 0 {
            self.packets_lost += delta as u64;
            self.expected_seq = Some(seq.wrapping_add(1));
            self.received_in_sequence += 1;
        } else {
            // already counted as lost when the gap was seen
            self.packets_out_of_order += 1;
        }
    }

    fn track_jitter(&mut self, timestamp: u32, arrival: Instant) {
        if let Some(prev) = self.last_transit {
            let arrival_units =
                arrival.saturating_duration_since(prev.arrival).as_secs_f64() * self.clock_rate as f64;
            let ts_units = timestamp.wrapping_sub(prev.timestamp) as i32 as f64;
            let d = (arrival_units - ts_units).abs();
            self.jitter += (d - self.jitter) / 16.0;
            let jitter_ms = self.jitter * 1000.0 / self.clock_rate as f64;
            self.jitter_samples.push(jitter_ms);
        }
        self.last_transit = Some(Transit { arrival, timestamp });
    }

    /// Start a fresh sequence space without counting the jump as loss
    pub fn reset_sequence(&mut self) {
        self.expected_seq = None;
        self.last_transit = None;
    }

    /// A packet was forwarded toward this leg
    pub fn record_sent(&mut self, _size: usize) {
        self.packets_sent += 1;
    }

    pub fn record_late(&mut self) {
        self.packets_late += 1;
    }

    /// One-way delay sample in milliseconds
    pub fn record_latency(&mut self, latency_ms: f64) {
        self.latency_samples.push(latency_ms.max(0.0));
    }

    pub fn loss_percent(&self) -> f64 {
        let expected = self.received_in_sequence + self.packets_lost;
        if expected == 0 {
            0.0
        } else {
            self.packets_lost as f64 * 100.0 / expected as f64
        }
    }

    pub fn snapshot(&self) -> QualityMetrics {
        let loss_percent = self.loss_percent();
        let jitter_ms = self.jitter_samples.average();
        let latency_ms = self.latency_samples.average();
        QualityMetrics {
            packets_sent: self.packets_sent,
            packets_received: self.packets_received,
            packets_lost: self.packets_lost,
            packets_out_of_order: self.packets_out_of_order,
            packets_late: self.packets_late,
            bytes_received: self.bytes_received,
            loss_percent,
            jitter_ms,
            max_jitter_ms: self.jitter_samples.peak(),
            latency_ms,
            max_latency_ms: self.latency_samples.peak(),
            mos: calculate_mos(loss_percent, latency_ms, jitter_ms),
        }
    }

    /// Close the monitor into a summary for history
    pub fn finalize(self) -> QualitySummary {
        let metrics = self.snapshot();
        QualitySummary {
            band: metrics.band(),
            call_id: self.call_id,
            leg: self.leg,
            started_at: self.started_at,
            ended_at: Utc::now(),
            metrics,
        }
    }
}
