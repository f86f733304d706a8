//! Collaborators wired from the `[collaborators]` configuration section.
//!
//! Extensions are bridged to fixed SIP contacts; voicemail, the
//! auto-attendant and paging answer with fixed RTP endpoints owned by
//! whatever external service plays prompts or records audio.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use switchboard_infra_common::config::CollaboratorsSection;
use switchboard_session_core::{
    CallContext, CallRecord, Collaborator, CollaboratorDecision, CollaboratorRegistry, Destination,
    DestinationKind, Result, SessionError, StaticMediaCollaborator,
};
use tracing::{debug, info};

/// Static extension-to-contact directory
#[derive(Debug, Clone, Default)]
pub struct ExtensionDirectory {
    contacts: HashMap<String, SocketAddr>,
}

impl ExtensionDirectory {
    pub fn new(contacts: HashMap<String, SocketAddr>) -> Self {
        Self { contacts }
    }

    pub fn contact(&self, extension: &str) -> Option<SocketAddr> {
        self.contacts.get(extension).copied()
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }
}

#[async_trait]
impl Collaborator for ExtensionDirectory {
    fn name(&self) -> &str {
        "extension-directory"
    }

    async fn on_call(&self, ctx: &CallContext) -> Result<CollaboratorDecision> {
        let Destination::Extension { number } = &ctx.destination else {
            return Err(SessionError::Collaborator {
                name: self.name().to_string(),
                reason: format!("cannot place a call to {}", ctx.destination),
            });
        };
        match self.contact(number) {
            Some(contact) => {
                debug!(call_id = %ctx.call_id, extension = %number, %contact, "bridging to extension");
                Ok(CollaboratorDecision::Bridge { contact, uri: None })
            }
            None => Err(SessionError::Collaborator {
                name: self.name().to_string(),
                reason: format!("extension {} is not provisioned", number),
            }),
        }
    }

    async fn on_call_ended(&self, record: &CallRecord) {
        debug!(call_id = %record.call_id, reason = ?record.end_reason, "extension call finished");
    }
}

/// Build the registry the daemon runs with
pub fn registry_from_config(section: &CollaboratorsSection) -> CollaboratorRegistry {
    let mut registry = CollaboratorRegistry::new();
    if !section.extensions.is_empty() {
        registry.register(
            DestinationKind::Extension,
            Arc::new(ExtensionDirectory::new(section.extensions.clone())),
        );
    }
    let media = [
        (DestinationKind::Voicemail, "voicemail", section.voicemail_media),
        (DestinationKind::AutoAttendant, "auto-attendant", section.auto_attendant_media),
        (DestinationKind::Paging, "paging", section.paging_media),
    ];
    for (kind, name, addr) in media {
        if let Some(addr) = addr {
            registry.register(kind, Arc::new(StaticMediaCollaborator::new(name, addr)));
        }
    }
    info!(
        extensions = section.extensions.len(),
        collaborators = registry.len(),
        "collaborators registered"
    );
    registry
}
