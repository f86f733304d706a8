//! Hand-off points to the subsystems outside the call-control core.
//!
//! Auto-attendant menus, voicemail, paging hardware and extension lookup
//! live behind the [`Collaborator`] trait. The coordinator consults the
//! collaborator registered for a call's [`DestinationKind`] and acts on the
//! returned [`CollaboratorDecision`]; it never discovers collaborators on
//! its own.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use switchboard_media_core::DetectedDigit;
use switchboard_sip_core::sdp::SessionDescription;
use switchboard_sip_core::types::SipUri;

use crate::coordinator::CallRecord;
use crate::error::Result;
use crate::routing::{Destination, DestinationKind};

/// What a collaborator learns about a call it is asked to handle
#[derive(Debug, Clone)]
pub struct CallContext {
    pub call_id: String,
    pub from: String,
    pub to: String,
    pub destination: Destination,
    /// The caller's session description, when the INVITE carried one
    pub offer: Option<SessionDescription>,
    /// Codecs the caller will be answered with, in the caller's order
    pub codecs: Vec<u8>,
    pub dtmf_payload_type: Option<u8>,
}

/// How a collaborator wants the call handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorDecision {
    /// Answer the caller and relay its media to/from `media`
    Answer { media: SocketAddr },
    /// Hand the call to another destination
    Redirect { destination: Destination },
    /// Ring a SIP endpoint and bridge the two calls
    Bridge { contact: SocketAddr, uri: Option<SipUri> },
}

/// A subsystem that takes ownership of calls for one destination kind
#[async_trait]
pub trait Collaborator: Send + Sync {
    fn name(&self) -> &str;

    async fn on_call(&self, ctx: &CallContext) -> Result<CollaboratorDecision>;

    /// A digit was pressed while this collaborator owned the call
    async fn on_digit(&self, _call_id: &str, _digit: DetectedDigit) {}

    /// A transfer requested for a call owned by this collaborator failed
    async fn on_transfer_failed(&self, _call_id: &str, _target: &str, _reason: &str) {}

    async fn on_call_ended(&self, _record: &CallRecord) {}
}

/// Destination kind to collaborator table, built at startup
#[derive(Clone, Default)]
pub struct CollaboratorRegistry {
    entries: HashMap<DestinationKind, Arc<dyn Collaborator>>,
}

impl CollaboratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: DestinationKind, collaborator: Arc<dyn Collaborator>) -> &mut Self {
        self.entries.insert(kind, collaborator);
        self
    }

    pub fn with(mut self, kind: DestinationKind, collaborator: Arc<dyn Collaborator>) -> Self {
        self.register(kind, collaborator);
        self
    }

    pub fn get(&self, kind: DestinationKind) -> Option<Arc<dyn Collaborator>> {
        self.entries.get(&kind).cloned()
    }

    pub fn contains(&self, kind: DestinationKind) -> bool {
        self.entries.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for CollaboratorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (kind, collaborator) in &self.entries {
            map.entry(kind, &collaborator.name());
        }
        map.finish()
    }
}

/// Answers every call with a fixed media endpoint
#[derive(Debug, Clone)]
pub struct StaticMediaCollaborator {
    name: String,
    media: SocketAddr,
}

impl StaticMediaCollaborator {
    pub fn new(name: impl Into<String>, media: SocketAddr) -> Self {
        Self {
            name: name.into(),
            media,
        }
    }
}

#[async_trait]
impl Collaborator for StaticMediaCollaborator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_call(&self, _ctx: &CallContext) -> Result<CollaboratorDecision> {
        Ok(CollaboratorDecision::Answer { media: self.media })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> CallContext {
        CallContext {
            call_id: "c1".into(),
            from: "sip:1001@pbx".into(),
            to: "sip:0@pbx".into(),
            destination: Destination::AutoAttendant,
            offer: None,
            codecs: vec![0, 8],
            dtmf_payload_type: Some(101),
        }
    }

    #[tokio::test]
    async fn registry_dispatches_by_kind() {
        let media: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let registry = CollaboratorRegistry::new().with(
            DestinationKind::AutoAttendant,
            Arc::new(StaticMediaCollaborator::new("ivr", media)),
        );
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains(DestinationKind::Voicemail));

        let ivr = registry.get(DestinationKind::AutoAttendant).unwrap();
        assert_eq!(ivr.name(), "ivr");
        assert_eq!(
            ivr.on_call(&ctx()).await.unwrap(),
            CollaboratorDecision::Answer { media }
        );
        assert!(format!("{:?}", registry).contains("ivr"));
    }
}
