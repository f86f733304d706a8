//! The forwarding task behind a [`MediaRelay`](super::MediaRelay).

use std::net::SocketAddr;
use std::time::Instant;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use super::{LegConfig, LegSide, MediaEvent, RelayCommand, RelayConfig, RelayReport};
use crate::codec::decode_to_linear;
use crate::dtmf::{DtmfDigit, DtmfSource, EventDecoder, ToneDetector, ToneDetectorConfig};
use crate::quality::{QualityMonitor, QualitySummary};
use crate::rtp_processing::rtcp::{parse_compound, RtcpPacket, RttTracker};
use crate::rtp_processing::{is_rtcp, JitterBuffer, JitterBufferConfig, PushOutcome, RtpPacket};
use switchboard_infra_common::config::DtmfMode;

/// Sends relay events tagged with the call they belong to
struct EventSink {
    call_id: String,
    tx: mpsc::UnboundedSender<MediaEvent>,
}

impl EventSink {
    fn send(&self, event: MediaEvent) {
        // receiver gone means the call is being torn down
        let _ = self.tx.send(event);
    }

    fn tone(&self, leg: LegSide, digit: DtmfDigit, source: DtmfSource, duration_ms: u32) {
        debug!(call_id = %self.call_id, %leg, %digit, %source, "digit detected");
        self.send(MediaEvent::ToneDetected {
            call_id: self.call_id.clone(),
            leg,
            digit,
            source,
            duration_ms,
        });
    }
}

/// Everything owned by one side of the relay
struct LegState {
    side: LegSide,
    socket: UdpSocket,
    signaled: Option<SocketAddr>,
    learned: Option<SocketAddr>,
    /// Source seen instead of the learned address, and how many times in a row
    candidate: Option<(SocketAddr, u32)>,
    dtmf_payload_type: Option<u8>,
    clock_rate: u32,
    ssrc: Option<u32>,
    monitor: QualityMonitor,
    jitter: JitterBuffer,
    events: EventDecoder,
    detector: Option<ToneDetector>,
    /// Sender reports forwarded toward this leg
    rtt: RttTracker,
}

impl LegState {
    fn new(call_id: &str, side: LegSide, leg: LegConfig, config: &RelayConfig) -> Self {
        let clock_rate = leg.clock_rate();
        let frame_duration = leg.frame_duration();
        let detector = matches!(config.dtmf_mode, DtmfMode::Auto | DtmfMode::Inband).then(|| {
            ToneDetector::new(ToneDetectorConfig {
                sample_rate: clock_rate,
                frame_size: (clock_rate / 50) as usize,
                ..ToneDetectorConfig::default()
            })
        });
        Self {
            side,
            signaled: leg.signaled_remote,
            learned: None,
            candidate: None,
            dtmf_payload_type: leg.dtmf_payload_type,
            clock_rate,
            ssrc: None,
            monitor: QualityMonitor::new(call_id, side, clock_rate, config.sample_window),
            jitter: JitterBuffer::new(JitterBufferConfig {
                depth_frames: config.jitter_depth_frames,
                frame_duration,
                clock_rate,
            }),
            events: EventDecoder::new(),
            detector,
            rtt: RttTracker::new(),
            socket: leg.socket,
        }
    }

    fn destination(&self) -> Option<SocketAddr> {
        self.learned.or(self.signaled)
    }

    /// Symmetric address learning; returns the address when it changes
    fn learn(&mut self, src: SocketAddr, threshold: u32) -> Option<SocketAddr> {
        match self.learned {
            None => {
                self.learned = Some(src);
                self.candidate = None;
                Some(src)
            }
            Some(current) if current == src => {
                self.candidate = None;
                None
            }
            Some(_) => {
                let seen = match self.candidate {
                    Some((addr, n)) if addr == src => n + 1,
                    _ => 1,
                };
                if seen >= threshold.max(1) {
                    self.learned = Some(src);
                    self.candidate = None;
                    Some(src)
                } else {
                    self.candidate = Some((src, seen));
                    None
                }
            }
        }
    }

    fn inband_duration_ms(&self) -> u32 {
        self.detector.as_ref().map_or(0, |d| {
            let cfg = d.config();
            (cfg.min_on_frames as u64 * cfg.frame_size as u64 * 1000 / cfg.sample_rate.max(1) as u64) as u32
        })
    }

    fn detect_inband(&mut self, packet: &RtpPacket, sink: &EventSink) {
        let duration_ms = self.inband_duration_ms();
        let Some(detector) = self.detector.as_mut() else {
            return;
        };
        let Some(samples) = decode_to_linear(packet.header.payload_type, &packet.payload) else {
            return;
        };
        for digit in detector.process(&samples) {
            sink.tone(self.side, digit, DtmfSource::Inband, duration_ms);
        }
    }

    /// Hand due packets from the jitter buffer to the in-band detector
    fn release_ready(&mut self, now: Instant, sink: &EventSink) {
        for entry in self.jitter.pop_ready(now) {
            self.detect_inband(&entry.packet, sink);
        }
    }

    fn on_event_packet(&mut self, packet: &RtpPacket, sink: &EventSink) {
        match self.events.push(packet.header.timestamp, &packet.payload) {
            Ok(completed) => {
                for event in completed {
                    sink.tone(self.side, event.digit, DtmfSource::Rfc4733, event.duration_ms(self.clock_rate));
                }
            }
            Err(e) => debug!(call_id = %sink.call_id, leg = %self.side, error = %e, "bad telephone-event payload"),
        }
    }

    fn on_audio_packet(&mut self, packet: RtpPacket, now: Instant, sink: &EventSink) {
        if self.ssrc != Some(packet.header.ssrc) {
            if self.ssrc.is_some() {
                self.jitter.reset();
                if let Some(detector) = self.detector.as_mut() {
                    detector.reset();
                }
            }
            self.ssrc = Some(packet.header.ssrc);
        }
        if self.jitter.push(packet, now) == PushOutcome::Late {
            self.monitor.record_late();
        }
        self.release_ready(now, sink);
    }

    /// Flush decoders and close the monitor
    fn finish(mut self, sink: &EventSink) -> QualitySummary {
        if let Some(event) = self.events.flush() {
            sink.tone(self.side, event.digit, DtmfSource::Rfc4733, event.duration_ms(self.clock_rate));
        }
        for entry in self.jitter.drain() {
            self.detect_inband(&entry.packet, sink);
        }
        self.monitor.finalize()
    }
}

/// Bidirectional forwarding loop for one call
pub struct PacketForwarder {
    config: RelayConfig,
    a: LegState,
    b: LegState,
    sink: EventSink,
    forwarded: u64,
}

impl PacketForwarder {
    pub fn new(
        call_id: String,
        a: LegConfig,
        b: LegConfig,
        config: RelayConfig,
        events: mpsc::UnboundedSender<MediaEvent>,
    ) -> Self {
        Self {
            a: LegState::new(&call_id, LegSide::A, a, &config),
            b: LegState::new(&call_id, LegSide::B, b, &config),
            config,
            sink: EventSink { call_id, tx: events },
            forwarded: 0,
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::Receiver<RelayCommand>) -> RelayReport {
        let size = self.config.max_packet_size.max(64);
        let mut buf_a = vec![0u8; size];
        let mut buf_b = vec![0u8; size];

        let mut tick = tokio::time::interval(self.config.tick_interval.max(std::time::Duration::from_millis(1)));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let period = self.config.snapshot_interval.max(std::time::Duration::from_secs(1));
        let mut snapshots = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        snapshots.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                res = self.a.socket.recv_from(&mut buf_a) => match res {
                    Ok((len, src)) => self.on_datagram(LegSide::A, &buf_a[..len], src).await,
                    Err(e) => self.on_socket_error(LegSide::A, e),
                },
                res = self.b.socket.recv_from(&mut buf_b) => match res {
                    Ok((len, src)) => self.on_datagram(LegSide::B, &buf_b[..len], src).await,
                    Err(e) => self.on_socket_error(LegSide::B, e),
                },
                cmd = commands.recv() => match cmd {
                    Some(RelayCommand::ReplaceLeg { side, leg, reply }) => {
                        let summary = self.replace_leg(side, leg);
                        let _ = reply.send(summary);
                    }
                    Some(RelayCommand::Snapshot { reply }) => {
                        let _ = reply.send([self.a.monitor.snapshot(), self.b.monitor.snapshot()]);
                    }
                    Some(RelayCommand::Stop) | None => break,
                },
                _ = tick.tick() => {
                    let now = Instant::now();
                    self.a.release_ready(now, &self.sink);
                    self.b.release_ready(now, &self.sink);
                }
                _ = snapshots.tick() => self.emit_snapshots(),
            }
        }

        let PacketForwarder { a, b, sink, forwarded, .. } = self;
        let summaries = vec![a.finish(&sink), b.finish(&sink)];
        RelayReport {
            call_id: sink.call_id,
            summaries,
            forwarded_packets: forwarded,
        }
    }

    async fn on_datagram(&mut self, side: LegSide, data: &[u8], src: SocketAddr) {
        let now = Instant::now();
        let threshold = self.config.relearn_threshold;
        let sink = &self.sink;
        let (from, to) = match side {
            LegSide::A => (&mut self.a, &mut self.b),
            LegSide::B => (&mut self.b, &mut self.a),
        };

        if let Some(addr) = from.learn(src, threshold) {
            info!(call_id = %sink.call_id, leg = %side, %addr, "learned media address");
            sink.send(MediaEvent::AddressLearned {
                call_id: sink.call_id.clone(),
                leg: side,
                addr,
            });
        }
        if from.learned != Some(src) {
            trace!(call_id = %sink.call_id, leg = %side, %src, "packet from unconfirmed source dropped");
            return;
        }

        if is_rtcp(data) {
            inspect_rtcp(from, to, data, now);
            forward(to, data, sink).await;
            return;
        }

        let packet = match RtpPacket::parse(data) {
            Ok(packet) => packet,
            Err(e) => {
                debug!(call_id = %sink.call_id, leg = %side, error = %e, "non-RTP datagram dropped");
                return;
            }
        };

        if forward(to, data, sink).await {
            to.monitor.record_sent(data.len());
            self.forwarded += 1;
        }

        if from.dtmf_payload_type == Some(packet.header.payload_type) {
            from.monitor.record_received_event(&packet.header, data.len());
            from.on_event_packet(&packet, sink);
        } else {
            from.monitor.record_received(&packet.header, data.len(), now);
            from.on_audio_packet(packet, now, sink);
        }
    }

    fn on_socket_error(&self, side: LegSide, error: std::io::Error) {
        warn!(call_id = %self.sink.call_id, leg = %side, error = %error, "media socket error");
        self.sink.send(MediaEvent::RelayError {
            call_id: self.sink.call_id.clone(),
            leg: side,
            error: error.to_string(),
        });
    }

    fn replace_leg(&mut self, side: LegSide, leg: LegConfig) -> QualitySummary {
        let fresh = LegState::new(&self.sink.call_id, side, leg, &self.config);
        let slot = match side {
            LegSide::A => &mut self.a,
            LegSide::B => &mut self.b,
        };
        let old = std::mem::replace(slot, fresh);
        info!(call_id = %self.sink.call_id, leg = %side, "media leg replaced");
        old.finish(&self.sink)
    }

    fn emit_snapshots(&self) {
        for leg in [&self.a, &self.b] {
            self.sink.send(MediaEvent::QualitySnapshot {
                call_id: self.sink.call_id.clone(),
                leg: leg.side,
                metrics: leg.monitor.snapshot(),
            });
        }
    }
}

/// Send a datagram to the leg's peer; true if it went out
async fn forward(to: &LegState, data: &[u8], sink: &EventSink) -> bool {
    let Some(dest) = to.destination() else {
        trace!(call_id = %sink.call_id, leg = %to.side, "no destination yet, packet dropped");
        return false;
    };
    match to.socket.send_to(data, dest).await {
        Ok(_) => true,
        Err(e) => {
            debug!(call_id = %sink.call_id, leg = %to.side, %dest, error = %e, "forward failed");
            false
        }
    }
}

/// Note SRs headed to `to`; turn report blocks from `from` into latency
fn inspect_rtcp(from: &mut LegState, to: &mut LegState, data: &[u8], now: Instant) {
    let packets = match parse_compound(data) {
        Ok(packets) => packets,
        Err(e) => {
            trace!(leg = %from.side, error = %e, "unparseable RTCP forwarded as-is");
            return;
        }
    };
    for packet in packets {
        let reports = match packet {
            RtcpPacket::SenderReport { ntp, reports, .. } => {
                to.rtt.note_forwarded(ntp, now);
                reports
            }
            RtcpPacket::ReceiverReport { reports, .. } => reports,
            RtcpPacket::Other { .. } => continue,
        };
        for block in reports {
            if let Some(rtt) = from.rtt.on_report(&block, now) {
                let one_way_ms = rtt.as_secs_f64() * 1000.0 / 2.0;
                trace!(leg = %from.side, rtt_ms = one_way_ms * 2.0, "RTCP round trip");
                from.monitor.record_latency(one_way_ms);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtp_processing::rtcp::tests::{receiver_report, sender_report};
    use crate::rtp_processing::NtpTimestamp;
    use bytes::Bytes;
    use std::time::Duration;

    async fn leg_state(side: LegSide) -> LegState {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        LegState::new("call", side, LegConfig::new(socket), &RelayConfig::default())
    }

    fn sink() -> (EventSink, mpsc::UnboundedReceiver<MediaEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventSink { call_id: "call".into(), tx }, rx)
    }

    #[tokio::test]
    async fn relearns_after_threshold() {
        let mut leg = leg_state(LegSide::A).await;
        let first: SocketAddr = "10.0.0.1:4000".parse().unwrap();
        let moved: SocketAddr = "10.0.0.2:4000".parse().unwrap();
        assert_eq!(leg.learn(first, 3), Some(first));
        assert_eq!(leg.learn(moved, 3), None);
        assert_eq!(leg.learn(first, 3), None, "interleaved original resets the count");
        assert_eq!(leg.learn(moved, 3), None);
        assert_eq!(leg.learn(moved, 3), None);
        assert_eq!(leg.learn(moved, 3), Some(moved));
        assert_eq!(leg.destination(), Some(moved));
    }

    #[tokio::test]
    async fn rtcp_round_trip_becomes_latency() {
        let mut a = leg_state(LegSide::A).await;
        let mut b = leg_state(LegSide::B).await;
        let ntp = NtpTimestamp { seconds: 100, fraction: 0 };
        let t0 = Instant::now();
        // SR from A is forwarded toward B
        inspect_rtcp(&mut a, &mut b, &sender_report(1, ntp), t0);
        // B echoes it 300 ms later having held it for 100 ms
        let rr = receiver_report(2, ntp.middle32(), 6554);
        inspect_rtcp(&mut b, &mut a, &rr, t0 + Duration::from_millis(300));
        let latency = b.monitor.snapshot().latency_ms;
        assert!((latency - 100.0).abs() < 1.0, "latency {}", latency);
        assert_eq!(a.monitor.snapshot().latency_ms, 0.0);
    }

    #[tokio::test]
    async fn event_packets_bypass_jitter_buffer() {
        let mut leg = leg_state(LegSide::A).await;
        leg.dtmf_payload_type = Some(101);
        let (sink, mut rx) = sink();
        let end = crate::dtmf::ToneEvent::new(DtmfDigit::Digit9, true, 10, 800).encode();
        let packet = RtpPacket::new(101, 1, 0, 5, Bytes::copy_from_slice(&end));
        leg.on_event_packet(&packet, &sink);
        assert!(leg.jitter.is_empty());
        match rx.try_recv().unwrap() {
            MediaEvent::ToneDetected { digit, source, duration_ms, .. } => {
                assert_eq!(digit, DtmfDigit::Digit9);
                assert_eq!(source, DtmfSource::Rfc4733);
                assert_eq!(duration_ms, 100);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn inband_digit_from_relayed_audio() {
        let mut leg = leg_state(LegSide::B).await;
        let (sink, mut rx) = sink();
        let audio = crate::dtmf::generate_dtmf(DtmfDigit::Digit5, 8000, 100, 12000);
        let t0 = Instant::now();
        for (i, frame) in audio.chunks(160).enumerate() {
            let payload = crate::codec::G711Variant::PCMU.encode(frame);
            let packet = RtpPacket::new(0, i as u16, i as u32 * 160, 9, Bytes::from(payload));
            leg.on_audio_packet(packet, t0, &sink);
        }
        let summary = leg.finish(&sink);
        assert_eq!(summary.leg, LegSide::B);
        let digits: Vec<DtmfDigit> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|e| match e {
                MediaEvent::ToneDetected { digit, .. } => Some(digit),
                _ => None,
            })
            .collect();
        assert_eq!(digits, vec![DtmfDigit::Digit5]);
    }
}
