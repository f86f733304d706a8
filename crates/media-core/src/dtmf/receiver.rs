//! Merges digits from every active signaling path into one stream.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use switchboard_infra_common::config::DtmfMode;
use tracing::{debug, trace};

use super::{DetectedDigit, DtmfDigit, DtmfSource};

/// Per-call digit merger.
///
/// In `Auto` mode every path is accepted until a signaled digit (RFC 4733 or
/// INFO) arrives; from then on the in-band detector is ignored for the call,
/// since the phone evidently signals digits explicitly. A digit reported by
/// a second path inside the coincidence window is counted once.
#[derive(Debug)]
pub struct DtmfReceiver {
    mode: DtmfMode,
    window: Duration,
    recent: VecDeque<DetectedDigit>,
    signaled_seen: bool,
}

impl DtmfReceiver {
    pub fn new(mode: DtmfMode, coincidence_window: Duration) -> Self {
        Self {
            mode,
            window: coincidence_window,
            recent: VecDeque::new(),
            signaled_seen: false,
        }
    }

    pub fn mode(&self) -> DtmfMode {
        self.mode
    }

    /// Whether digits from `source` are currently accepted
    pub fn accepts(&self, source: DtmfSource) -> bool {
        match (self.mode, source) {
            (DtmfMode::Auto, DtmfSource::Inband) => !self.signaled_seen,
            (DtmfMode::Auto, _) => true,
            (DtmfMode::Rfc4733, DtmfSource::Rfc4733) => true,
            (DtmfMode::Info, DtmfSource::Info) => true,
            (DtmfMode::Inband, DtmfSource::Inband) => true,
            _ => false,
        }
    }

    /// Offer a digit; returns it if it should be delivered
    pub fn offer(
        &mut self,
        digit: DtmfDigit,
        source: DtmfSource,
        duration_ms: u32,
        at: Instant,
    ) -> Option<DetectedDigit> {
        if !self.accepts(source) {
            trace!(%digit, %source, "digit from inactive path ignored");
            return None;
        }
        if source != DtmfSource::Inband {
            self.signaled_seen = true;
        }

        while let Some(front) = self.recent.front() {
            if at.saturating_duration_since(front.at) > self.window {
                self.recent.pop_front();
            } else {
                break;
            }
        }

        let coincident = self
            .recent
            .iter()
            .any(|r| r.digit == digit && r.source != source);
        if coincident {
            debug!(%digit, %source, "digit already reported by another path");
            return None;
        }

        let detected = DetectedDigit {
            digit,
            source,
            duration_ms,
            at,
        };
        self.recent.push_back(detected);
        Some(detected)
    }
}
