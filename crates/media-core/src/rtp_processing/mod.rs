//! RTP/RTCP wire handling and the playout jitter buffer.

pub mod jitter;
pub mod packet;
pub mod rtcp;

pub use jitter::{JitterBuffer, JitterBufferConfig, JitterBufferEntry, JitterBufferStats, PushOutcome};
pub use packet::{is_rtcp, RtpHeader, RtpPacket, RTP_HEADER_LEN, RTP_VERSION};
pub use rtcp::{parse_compound, NtpTimestamp, ReportBlock, RtcpPacket, RttTracker};
