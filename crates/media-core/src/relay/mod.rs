//! # Media Relay
//!
//! A [`MediaRelay`] owns the two sockets of one call's media path and runs
//! a single forwarding task over both of them. Per packet it learns the
//! sender's real address, forwards the datagram untouched to the opposite
//! leg, and feeds the leg's own jitter buffer, tone decoders and quality
//! monitor.
//!
//! The task is driven through a command channel (leg replacement for
//! transfers, snapshots, stop) and reports through an unbounded
//! [`MediaEvent`] channel, so the signaling side never blocks on media.

pub mod packet_forwarder;
pub mod ports;

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchboard_infra_common::config::{DtmfMode, MediaSection, QualitySection};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::codec::codec_info_or_default;
use crate::dtmf::{DtmfDigit, DtmfSource};
use crate::error::{MediaError, Result, SocketError};
use crate::quality::{QualityMetrics, QualitySummary};

pub use packet_forwarder::PacketForwarder;
pub use ports::PortAllocator;

const COMMAND_BUFFER: usize = 16;

/// Which side of the relay a leg sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegSide {
    A,
    B,
}

impl LegSide {
    pub fn opposite(self) -> Self {
        match self {
            LegSide::A => LegSide::B,
            LegSide::B => LegSide::A,
        }
    }
}

impl fmt::Display for LegSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LegSide::A => "a",
            LegSide::B => "b",
        })
    }
}

/// One leg's socket and negotiated parameters
#[derive(Debug)]
pub struct LegConfig {
    pub socket: UdpSocket,
    /// Address from SDP; used only until the peer's real address is learned
    pub signaled_remote: Option<SocketAddr>,
    /// Telephone-event payload type negotiated for this leg
    pub dtmf_payload_type: Option<u8>,
    /// First negotiated audio payload type; sets clock rate and frame size
    pub audio_payload_type: u8,
}

impl LegConfig {
    pub fn new(socket: UdpSocket) -> Self {
        Self {
            socket,
            signaled_remote: None,
            dtmf_payload_type: None,
            audio_payload_type: 0,
        }
    }

    pub fn with_remote(mut self, remote: SocketAddr) -> Self {
        self.signaled_remote = Some(remote);
        self
    }

    pub fn with_dtmf_payload_type(mut self, payload_type: u8) -> Self {
        self.dtmf_payload_type = Some(payload_type);
        self
    }

    pub fn with_audio_payload_type(mut self, payload_type: u8) -> Self {
        self.audio_payload_type = payload_type;
        self
    }

    pub fn clock_rate(&self) -> u32 {
        codec_info_or_default(self.audio_payload_type).clock_rate
    }

    pub fn frame_duration(&self) -> Duration {
        codec_info_or_default(self.audio_payload_type).frame_duration()
    }
}

/// Relay-wide tuning
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub jitter_depth_frames: usize,
    /// Consecutive packets from a new source before it replaces the learned one
    pub relearn_threshold: u32,
    pub dtmf_mode: DtmfMode,
    pub snapshot_interval: Duration,
    pub max_packet_size: usize,
    pub sample_window: usize,
    /// Jitter buffer release cadence
    pub tick_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from_sections(&MediaSection::default(), &QualitySection::default())
    }
}

impl RelayConfig {
    pub fn from_sections(media: &MediaSection, quality: &QualitySection) -> Self {
        Self {
            jitter_depth_frames: media.jitter_depth_frames,
            relearn_threshold: media.relearn_threshold,
            dtmf_mode: media.dtmf_mode,
            snapshot_interval: Duration::from_secs(media.quality_snapshot_interval_secs),
            max_packet_size: media.max_packet_size,
            sample_window: quality.sample_window,
            tick_interval: Duration::from_millis(20),
        }
    }
}

/// Events emitted by a running relay
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    ToneDetected {
        call_id: String,
        leg: LegSide,
        digit: DtmfDigit,
        source: DtmfSource,
        duration_ms: u32,
    },
    AddressLearned {
        call_id: String,
        leg: LegSide,
        addr: SocketAddr,
    },
    QualitySnapshot {
        call_id: String,
        leg: LegSide,
        metrics: QualityMetrics,
    },
    RelayError {
        call_id: String,
        leg: LegSide,
        error: String,
    },
}

impl MediaEvent {
    pub fn call_id(&self) -> &str {
        match self {
            MediaEvent::ToneDetected { call_id, .. }
            | MediaEvent::AddressLearned { call_id, .. }
            | MediaEvent::QualitySnapshot { call_id, .. }
            | MediaEvent::RelayError { call_id, .. } => call_id,
        }
    }
}

/// What a stopped relay hands back
#[derive(Debug, Clone)]
pub struct RelayReport {
    pub call_id: String,
    /// Leg A then leg B
    pub summaries: Vec<QualitySummary>,
    pub forwarded_packets: u64,
}

#[derive(Debug)]
pub(crate) enum RelayCommand {
    ReplaceLeg {
        side: LegSide,
        leg: LegConfig,
        reply: oneshot::Sender<QualitySummary>,
    },
    Snapshot {
        reply: oneshot::Sender<[QualityMetrics; 2]>,
    },
    Stop,
}

/// Handle to a running relay task
#[derive(Debug)]
pub struct MediaRelay {
    call_id: String,
    local_a: SocketAddr,
    local_b: SocketAddr,
    commands: mpsc::Sender<RelayCommand>,
    task: Option<JoinHandle<RelayReport>>,
}

impl MediaRelay {
    /// Spawn the forwarding task for two legs
    pub fn start(
        call_id: impl Into<String>,
        a: LegConfig,
        b: LegConfig,
        config: RelayConfig,
        events: mpsc::UnboundedSender<MediaEvent>,
    ) -> Result<Self> {
        let call_id = call_id.into();
        let local_a = a.socket.local_addr().map_err(SocketError::from)?;
        let local_b = b.socket.local_addr().map_err(SocketError::from)?;

        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let forwarder = PacketForwarder::new(call_id.clone(), a, b, config, events);
        let task = tokio::spawn(forwarder.run(rx));

        info!(call_id = %call_id, %local_a, %local_b, "media relay started");
        Ok(Self {
            call_id,
            local_a,
            local_b,
            commands: tx,
            task: Some(task),
        })
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn local_addr(&self, side: LegSide) -> SocketAddr {
        match side {
            LegSide::A => self.local_a,
            LegSide::B => self.local_b,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map_or(false, |t| !t.is_finished())
    }

    fn closed(&self) -> MediaError {
        MediaError::RelayClosed {
            call_id: self.call_id.clone(),
        }
    }

    /// Swap one leg for a new socket/peer, returning the old leg's summary
    pub async fn replace_leg(&mut self, side: LegSide, leg: LegConfig) -> Result<QualitySummary> {
        let local = leg.socket.local_addr().map_err(SocketError::from)?;
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(RelayCommand::ReplaceLeg { side, leg, reply })
            .await
            .map_err(|_| self.closed())?;
        let summary = rx.await.map_err(|_| self.closed())?;
        match side {
            LegSide::A => self.local_a = local,
            LegSide::B => self.local_b = local,
        }
        Ok(summary)
    }

    /// Current metrics for leg A and leg B
    pub async fn snapshot(&self) -> Result<[QualityMetrics; 2]> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(RelayCommand::Snapshot { reply })
            .await
            .map_err(|_| self.closed())?;
        rx.await.map_err(|_| self.closed())
    }

    /// Stop forwarding, release both sockets and finalize both monitors
    pub async fn stop(mut self) -> Result<RelayReport> {
        let _ = self.commands.send(RelayCommand::Stop).await;
        let task = self.task.take().ok_or_else(|| self.closed())?;
        match task.await {
            Ok(report) => {
                info!(call_id = %self.call_id, forwarded = report.forwarded_packets, "media relay stopped");
                Ok(report)
            }
            Err(e) => {
                warn!(call_id = %self.call_id, error = %e, "media relay task failed");
                Err(self.closed())
            }
        }
    }
}

impl Drop for MediaRelay {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leg_side_helpers() {
        assert_eq!(LegSide::A.opposite(), LegSide::B);
        assert_eq!(LegSide::B.to_string(), "b");
        assert_eq!(serde_json::to_string(&LegSide::A).unwrap(), "\"a\"");
    }

    #[test]
    fn config_from_sections() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.jitter_depth_frames, 3);
        assert_eq!(cfg.relearn_threshold, 3);
        assert_eq!(cfg.snapshot_interval, Duration::from_secs(30));
        assert_eq!(cfg.sample_window, 100);
    }

    #[tokio::test]
    async fn leg_config_timing() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let leg = LegConfig::new(socket).with_audio_payload_type(4);
        assert_eq!(leg.clock_rate(), 8000);
        assert_eq!(leg.frame_duration(), Duration::from_millis(30));
    }
}
