//! # Switchboard media plane
//!
//! RTP forwarding between the two legs of a call, with everything the
//! relay observes along the way:
//!
//! - [`rtp_processing`]: RTP/RTCP parsing and the playout jitter buffer
//! - [`codec`]: payload type facts and G.711 sample conversion
//! - [`dtmf`]: RFC 4733 events, SIP INFO bodies, in-band detection and the
//!   merging receiver
//! - [`quality`]: per-direction monitors, MOS scoring, alerts and history
//! - [`relay`]: port allocation and the per-call forwarding task
//!
//! ```rust,no_run
//! use switchboard_media_core::relay::{LegConfig, MediaRelay, PortAllocator, RelayConfig};
//! use tokio::sync::mpsc;
//!
//! # async fn demo() -> switchboard_media_core::Result<()> {
//! let ports = PortAllocator::new("127.0.0.1".parse().unwrap(), 10000, 10100);
//! let a = LegConfig::new(ports.allocate().await?);
//! let b = LegConfig::new(ports.allocate().await?);
//! let (events_tx, _events_rx) = mpsc::unbounded_channel();
//! let relay = MediaRelay::start("call-1", a, b, RelayConfig::default(), events_tx)?;
//! let report = relay.stop().await?;
//! assert_eq!(report.summaries.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod dtmf;
pub mod error;
pub mod quality;
pub mod relay;
pub mod rtp_processing;

pub use error::{MediaError, Result, SocketError};
pub use switchboard_infra_common::config::DtmfMode;

pub use dtmf::{DetectedDigit, DtmfDigit, DtmfReceiver, DtmfSource, ToneEvent};
pub use quality::{
    QualityAlert, QualityBand, QualityHistory, QualityMetrics, QualityMonitor, QualitySummary, QualityThresholds,
};
pub use relay::{LegConfig, LegSide, MediaEvent, MediaRelay, PortAllocator, RelayConfig, RelayReport};
pub use rtp_processing::{JitterBuffer, JitterBufferConfig, RtpPacket};
