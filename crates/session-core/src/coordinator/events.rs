//! What the coordinator publishes, and what it tells itself.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use switchboard_media_core::{DtmfDigit, DtmfSource, QualityAlert, QualitySummary};

use crate::call::{Call, CallState, EndReason};
use crate::collaborator::{Collaborator, CollaboratorDecision};
use crate::error::Result;
use crate::routing::Destination;

/// Finished call, handed to reporting and storage collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub call_id: String,
    pub from: String,
    pub to: String,
    pub destination: Destination,
    pub created_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    pub ended_at: DateTime<Utc>,
    pub end_reason: EndReason,
    pub transfer_target: Option<String>,
    /// Per-direction summaries, including legs replaced by transfers
    pub quality: Vec<QualitySummary>,
}

impl CallRecord {
    pub(crate) fn from_call(call: &Call, reason: EndReason, quality: Vec<QualitySummary>) -> Self {
        Self {
            call_id: call.call_id.clone(),
            from: call.from.clone(),
            to: call.to.clone(),
            destination: call.destination.clone(),
            created_at: call.created_at,
            answered_at: call.answered_at,
            ended_at: call.ended_at.unwrap_or_else(Utc::now),
            end_reason: reason,
            transfer_target: call.transfer_target.clone(),
            quality,
        }
    }
}

/// Live notifications from the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CoordinatorEvent {
    StateChanged {
        call_id: String,
        state: CallState,
    },
    EarlyDisconnectSuppressed {
        call_id: String,
    },
    DigitReceived {
        call_id: String,
        digit: DtmfDigit,
        source: DtmfSource,
        duration_ms: u32,
    },
    QualityAlert(QualityAlert),
    TransferFailed {
        call_id: String,
        target: String,
        reason: String,
    },
}

impl CoordinatorEvent {
    pub fn call_id(&self) -> &str {
        match self {
            CoordinatorEvent::StateChanged { call_id, .. }
            | CoordinatorEvent::EarlyDisconnectSuppressed { call_id }
            | CoordinatorEvent::DigitReceived { call_id, .. }
            | CoordinatorEvent::TransferFailed { call_id, .. } => call_id,
            CoordinatorEvent::QualityAlert(alert) => &alert.call_id,
        }
    }
}

/// Work posted back to the signaling loop by timers, collaborator tasks and
/// the public API
pub(crate) enum Internal {
    Decision {
        call_id: String,
        hops: u8,
        collaborator: Arc<dyn Collaborator>,
        result: Result<CollaboratorDecision>,
    },
    TransferDecision {
        call_id: String,
        target: String,
        destination: Destination,
        hops: u8,
        collaborator: Arc<dyn Collaborator>,
        result: Result<CollaboratorDecision>,
    },
    Transfer {
        call_id: String,
        target: String,
    },
    Hangup {
        call_id: String,
    },
    AckTimeout {
        call_id: String,
    },
    NoAnswer {
        call_id: String,
    },
    InviteTimeout {
        call_id: String,
        leg_call_id: String,
    },
    Shutdown {
        done: tokio::sync::oneshot::Sender<()>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_tag() {
        let event = CoordinatorEvent::StateChanged {
            call_id: "c1".into(),
            state: CallState::Active,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "state_changed");
        assert_eq!(json["state"], "active");
        assert_eq!(event.call_id(), "c1");
    }
}
