//! Codec negotiation.
//!
//! The answer to a non-empty offer is the offer itself, in the offerer's
//! order. Endpoints reject answers whose first codec differs from their own
//! preference, so the negotiator never substitutes a server-side ranking.
//! Only device profiles may narrow the list, and they keep the order too.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::NegotiationError;

/// PCMU, PCMA and G.722, in that order
pub const DEFAULT_AUDIO_CODECS: [u8; 3] = [0, 8, 9];

/// Codec restriction for endpoints whose User-Agent contains a marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub user_agent_contains: String,
    pub allowed_codecs: Vec<u8>,
}

impl DeviceProfile {
    pub fn new(user_agent_contains: impl Into<String>, allowed_codecs: Vec<u8>) -> Self {
        DeviceProfile {
            user_agent_contains: user_agent_contains.into(),
            allowed_codecs,
        }
    }

    pub fn matches(&self, user_agent: &str) -> bool {
        user_agent
            .to_ascii_lowercase()
            .contains(&self.user_agent_contains.to_ascii_lowercase())
    }
}

/// Keep the offered codecs the device allows, in offer order.
///
/// The telephone-event payload type (when known) is always retained since it
/// is not an audio codec.
pub fn filter_for_device(offered: &[u8], profile: &DeviceProfile, event_pt: Option<u8>) -> Vec<u8> {
    offered
        .iter()
        .copied()
        .filter(|pt| Some(*pt) == event_pt || profile.allowed_codecs.contains(pt))
        .collect()
}

/// Builds answer codec lists
#[derive(Debug, Clone)]
pub struct CodecNegotiator {
    defaults: Vec<u8>,
    dtmf_pt: u8,
    profiles: Vec<DeviceProfile>,
}

impl CodecNegotiator {
    /// Defaults are [`DEFAULT_AUDIO_CODECS`] followed by `dtmf_pt`
    pub fn new(dtmf_pt: u8) -> Self {
        let mut defaults = DEFAULT_AUDIO_CODECS.to_vec();
        defaults.push(dtmf_pt);
        CodecNegotiator {
            defaults,
            dtmf_pt,
            profiles: Vec::new(),
        }
    }

    pub fn with_profiles(mut self, profiles: Vec<DeviceProfile>) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn default_codecs(&self) -> &[u8] {
        &self.defaults
    }

    pub fn dtmf_payload_type(&self) -> u8 {
        self.dtmf_pt
    }

    /// `offered` unchanged, or the default list when nothing was offered
    pub fn negotiate(&self, offered: &[u8]) -> Vec<u8> {
        if offered.is_empty() {
            self.defaults.clone()
        } else {
            offered.to_vec()
        }
    }

    pub fn profile_for(&self, user_agent: &str) -> Option<&DeviceProfile> {
        self.profiles.iter().find(|p| p.matches(user_agent))
    }

    /// Negotiate and then apply the device profile matching `user_agent`.
    ///
    /// `event_pt` is the telephone-event type named in the offer, if any.
    /// Fails when filtering leaves no audio codec.
    pub fn negotiate_for_device(
        &self,
        offered: &[u8],
        event_pt: Option<u8>,
        user_agent: Option<&str>,
    ) -> Result<Vec<u8>, NegotiationError> {
        let (base, event_pt) = if offered.is_empty() {
            (self.defaults.clone(), Some(self.dtmf_pt))
        } else {
            (offered.to_vec(), event_pt)
        };

        let Some((ua, profile)) = user_agent.and_then(|ua| self.profile_for(ua).map(|p| (ua, p)))
        else {
            return Ok(base);
        };

        let filtered = filter_for_device(&base, profile, event_pt);
        if filtered.iter().all(|pt| Some(*pt) == event_pt) {
            warn!(user_agent = ua, offered = ?base, "no common codec after device filtering");
            return Err(NegotiationError::NoCommonCodec {
                offered: base,
                device: ua.to_string(),
            });
        }
        debug!(user_agent = ua, answer = ?filtered, "applied device codec profile");
        Ok(filtered)
    }
}
