//! End-to-end relay scenarios over loopback UDP.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use switchboard_media_core::dtmf::{DtmfDigit, DtmfSource, EventEncoder};
use switchboard_media_core::quality::QualityMetrics;
use switchboard_media_core::relay::{LegConfig, LegSide, MediaEvent, MediaRelay, RelayConfig};
use switchboard_media_core::rtp_processing::RtpPacket;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::timeout;

const DTMF_PT: u8 = 101;

async fn socket() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

fn audio(seq: u16, ts: u32, ssrc: u32) -> Vec<u8> {
    RtpPacket::new(0, seq, ts, ssrc, Bytes::from(vec![0xFFu8; 160]))
        .serialize()
        .to_vec()
}

struct Rig {
    relay: MediaRelay,
    phone_a: UdpSocket,
    phone_b: UdpSocket,
    events: mpsc::UnboundedReceiver<MediaEvent>,
}

impl Rig {
    async fn new() -> Self {
        let phone_a = socket().await;
        let phone_b = socket().await;
        let a = LegConfig::new(socket().await)
            .with_remote(phone_a.local_addr().unwrap())
            .with_dtmf_payload_type(DTMF_PT);
        let b = LegConfig::new(socket().await)
            .with_remote(phone_b.local_addr().unwrap())
            .with_dtmf_payload_type(DTMF_PT);
        let (tx, events) = mpsc::unbounded_channel();
        let relay = MediaRelay::start("relay-test", a, b, RelayConfig::default(), tx).unwrap();
        Rig {
            relay,
            phone_a,
            phone_b,
            events,
        }
    }

    fn relay_addr(&self, side: LegSide) -> SocketAddr {
        self.relay.local_addr(side)
    }

    async fn wait_for_received(&self, a: u64, b: u64) -> [QualityMetrics; 2] {
        for _ in 0..300 {
            let snap = self.relay.snapshot().await.unwrap();
            if snap[0].packets_received >= a && snap[1].packets_received >= b {
                return snap;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("relay did not receive {} / {} packets", a, b);
    }

    async fn drain_events(&mut self) -> Vec<MediaEvent> {
        let mut out = Vec::new();
        while let Ok(Some(event)) = timeout(Duration::from_millis(200), self.events.recv()).await {
            out.push(event);
        }
        out
    }
}

#[tokio::test]
async fn interleaved_directions_report_zero_loss() {
    let rig = Rig::new().await;
    let to_a = rig.relay_addr(LegSide::A);
    let to_b = rig.relay_addr(LegSide::B);

    for i in 0..200u16 {
        let pa = audio(1000 + i, i as u32 * 160, 0xA);
        let pb = audio(500 + i, 40_000 + i as u32 * 160, 0xB);
        if i % 3 == 0 {
            rig.phone_b.send_to(&pb, to_b).await.unwrap();
            rig.phone_a.send_to(&pa, to_a).await.unwrap();
        } else {
            rig.phone_a.send_to(&pa, to_a).await.unwrap();
            rig.phone_b.send_to(&pb, to_b).await.unwrap();
        }
        if i % 10 == 9 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    let snap = rig.wait_for_received(200, 200).await;
    for metrics in &snap {
        assert_eq!(metrics.packets_lost, 0);
        assert_eq!(metrics.loss_percent, 0.0);
        assert_eq!(metrics.packets_sent, 200);
    }

    // A hears B's stream
    let mut buf = [0u8; 2048];
    let (len, _) = timeout(Duration::from_secs(1), rig.phone_a.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    let heard = RtpPacket::parse(&buf[..len]).unwrap();
    assert_eq!(heard.header.ssrc, 0xB);

    let Rig { relay, .. } = rig;
    let report = relay.stop().await.unwrap();
    assert_eq!(report.summaries.len(), 2);
    assert_eq!(report.summaries[0].leg, LegSide::A);
    assert_eq!(report.summaries[1].leg, LegSide::B);
    assert!(report.summaries.iter().all(|s| s.metrics.loss_percent == 0.0));
    assert_eq!(report.forwarded_packets, 400);
}

#[tokio::test]
async fn telephone_event_press_yields_one_digit() {
    let mut rig = Rig::new().await;
    let to_a = rig.relay_addr(LegSide::A);
    let mut encoder = EventEncoder::new(DTMF_PT, 0xA, 10).with_packet_interval(20);
    let packets = encoder.encode_press(DtmfDigit::Digit9, 16_000, 100);
    assert_eq!(packets.iter().filter(|p| p.payload[1] & 0x80 != 0).count(), 3);

    for packet in &packets {
        rig.phone_a.send_to(&packet.serialize(), to_a).await.unwrap();
    }

    let digits: Vec<(DtmfDigit, DtmfSource, LegSide)> = rig
        .drain_events()
        .await
        .into_iter()
        .filter_map(|e| match e {
            MediaEvent::ToneDetected { digit, source, leg, .. } => Some((digit, source, leg)),
            _ => None,
        })
        .collect();
    assert_eq!(digits, vec![(DtmfDigit::Digit9, DtmfSource::Rfc4733, LegSide::A)]);
}

#[tokio::test]
async fn learns_real_peer_address() {
    let phone_a = socket().await;
    let phone_b = socket().await;
    let stale: SocketAddr = "127.0.0.1:9".parse().unwrap();
    let a = LegConfig::new(socket().await).with_remote(phone_a.local_addr().unwrap());
    let b = LegConfig::new(socket().await).with_remote(stale);
    let (tx, mut events) = mpsc::unbounded_channel();
    let relay = MediaRelay::start("learn", a, b, RelayConfig::default(), tx).unwrap();

    phone_b
        .send_to(&audio(1, 0, 0xB), relay.local_addr(LegSide::B))
        .await
        .unwrap();
    let learned = timeout(Duration::from_secs(1), events.recv()).await.unwrap().unwrap();
    assert_eq!(
        learned,
        MediaEvent::AddressLearned {
            call_id: "learn".into(),
            leg: LegSide::B,
            addr: phone_b.local_addr().unwrap(),
        }
    );

    phone_a
        .send_to(&audio(7, 0, 0xA), relay.local_addr(LegSide::A))
        .await
        .unwrap();
    let mut buf = [0u8; 512];
    let (len, from) = timeout(Duration::from_secs(1), phone_b.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(from, relay.local_addr(LegSide::B));
    assert_eq!(RtpPacket::parse(&buf[..len]).unwrap().header.sequence_number, 7);
    relay.stop().await.unwrap();
}

#[tokio::test]
async fn replacing_a_leg_finalizes_its_monitor() {
    let mut rig = Rig::new().await;
    let to_b = rig.relay_addr(LegSide::B);
    for i in 0..5u16 {
        rig.phone_b.send_to(&audio(i, i as u32 * 160, 0xB), to_b).await.unwrap();
    }
    rig.wait_for_received(0, 5).await;

    let new_phone = socket().await;
    let replacement = LegConfig::new(socket().await).with_remote(new_phone.local_addr().unwrap());
    let old = rig.relay.replace_leg(LegSide::B, replacement).await.unwrap();
    assert_eq!(old.leg, LegSide::B);
    assert_eq!(old.metrics.packets_received, 5);
    assert_ne!(rig.relay.local_addr(LegSide::B), to_b);

    // the new leg starts with fresh counters
    let snap = rig.relay.snapshot().await.unwrap();
    assert_eq!(snap[1].packets_received, 0);

    new_phone
        .send_to(&audio(900, 0, 0xC), rig.relay.local_addr(LegSide::B))
        .await
        .unwrap();
    rig.wait_for_received(0, 1).await;
    let Rig { relay, .. } = rig;
    let report = relay.stop().await.unwrap();
    assert_eq!(report.summaries[1].metrics.packets_received, 1);
}

#[tokio::test]
async fn zero_length_rtcp_is_forwarded_without_stopping_the_relay() {
    let rig = Rig::new().await;
    let to_a = rig.relay_addr(LegSide::A);
    // RR header whose length field claims a single word
    let rtcp = [0x80u8, 201, 0, 0, 0, 0, 0, 0];
    rig.phone_a.send_to(&rtcp, to_a).await.unwrap();
    rig.phone_a.send_to(&audio(42, 0, 0xA), to_a).await.unwrap();

    let mut buf = [0u8; 2048];
    let (len, _) = timeout(Duration::from_secs(1), rig.phone_b.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..len], &rtcp);
    let (len, _) = timeout(Duration::from_secs(1), rig.phone_b.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(RtpPacket::parse(&buf[..len]).unwrap().header.sequence_number, 42);

    let snap = rig.wait_for_received(1, 0).await;
    assert_eq!(snap[0].packets_received, 1);
    let Rig { relay, .. } = rig;
    assert_eq!(relay.stop().await.unwrap().forwarded_packets, 1);
}
