//! Static payload type table (RFC 3551) for the codecs the relay knows how
//! to pace. Dynamic payload types resolve through the SDP rtpmap instead.

use std::time::Duration;

/// Timing facts about an audio codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecInfo {
    pub payload_type: u8,
    pub name: &'static str,
    /// RTP clock rate in Hz
    pub clock_rate: u32,
    /// Default packetization interval in milliseconds
    pub frame_ms: u32,
}

impl CodecInfo {
    pub fn frame_duration(&self) -> Duration {
        Duration::from_millis(self.frame_ms as u64)
    }

    /// RTP timestamp increment for one frame
    pub fn samples_per_frame(&self) -> u32 {
        self.clock_rate / 1000 * self.frame_ms
    }
}

const STATIC_CODECS: &[CodecInfo] = &[
    CodecInfo { payload_type: 0, name: "PCMU", clock_rate: 8000, frame_ms: 20 },
    CodecInfo { payload_type: 3, name: "GSM", clock_rate: 8000, frame_ms: 20 },
    CodecInfo { payload_type: 4, name: "G723", clock_rate: 8000, frame_ms: 30 },
    CodecInfo { payload_type: 8, name: "PCMA", clock_rate: 8000, frame_ms: 20 },
    // G.722 advertises 8000 in SDP for historical reasons (RFC 3551 4.5.2)
    CodecInfo { payload_type: 9, name: "G722", clock_rate: 8000, frame_ms: 20 },
    CodecInfo { payload_type: 18, name: "G729", clock_rate: 8000, frame_ms: 20 },
];

/// Look up a static payload type
pub fn codec_info(payload_type: u8) -> Option<CodecInfo> {
    STATIC_CODECS
        .iter()
        .find(|c| c.payload_type == payload_type)
        .copied()
}

/// Codec info for a payload type, falling back to an 8 kHz / 20 ms profile
/// for dynamic types.
pub fn codec_info_or_default(payload_type: u8) -> CodecInfo {
    codec_info(payload_type).unwrap_or(CodecInfo {
        payload_type,
        name: "dynamic",
        clock_rate: 8000,
        frame_ms: 20,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_lookup() {
        let pcma = codec_info(8).unwrap();
        assert_eq!(pcma.name, "PCMA");
        assert_eq!(pcma.samples_per_frame(), 160);
        assert_eq!(codec_info(4).unwrap().frame_duration(), Duration::from_millis(30));
        assert!(codec_info(101).is_none());
    }

    #[test]
    fn dynamic_defaults() {
        let info = codec_info_or_default(111);
        assert_eq!(info.payload_type, 111);
        assert_eq!(info.clock_rate, 8000);
    }
}
