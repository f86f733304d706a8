//! # Switchboard
//!
//! A small-office call-control engine: SIP signaling, an RTP relay with
//! per-direction quality monitoring, and DTMF collection over RFC 4733,
//! SIP INFO and in-band audio.
//!
//! This crate re-exports the workspace crates and carries the static
//! collaborators the `switchboard` daemon registers from its configuration.

#![warn(rust_2018_idioms)]

pub use switchboard_infra_common as infra_common;
pub use switchboard_media_core as media_core;
pub use switchboard_session_core as session_core;
pub use switchboard_sip_core as sip_core;

pub mod collaborators;

pub use collaborators::{registry_from_config, ExtensionDirectory};

/// Common imports for switchboard applications
pub mod prelude {
    pub use crate::collaborators::{registry_from_config, ExtensionDirectory};
    pub use crate::infra_common::SwitchboardConfig;
    pub use crate::session_core::{
        CallRecord, CallState, Collaborator, CollaboratorDecision, CollaboratorRegistry, CoordinatorEvent,
        Destination, DestinationKind, SessionCoordinator,
    };
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
