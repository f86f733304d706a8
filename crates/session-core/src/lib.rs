//! # Switchboard session layer
//!
//! Call control on top of the SIP codec and the media plane:
//!
//! - [`call`]: the per-call state machine, including the early-disconnect
//!   work-around for interactive destinations
//! - [`routing`]: the dial plan that turns a dialed number into a
//!   [`Destination`]
//! - [`collaborator`]: the hand-off contract to the subsystems that own
//!   voicemail, auto-attendant, paging and extension lookup
//! - [`dialog`]: dialog bookkeeping for both sides of a bridged call
//! - [`transport`]: the UDP signaling socket
//! - [`coordinator`]: the [`SessionCoordinator`] event loop tying it all
//!   together
//!
//! The coordinator is an explicitly constructed value; nothing here is
//! global. Collaborators are registered up front in a
//! [`CollaboratorRegistry`] keyed by [`DestinationKind`].

pub mod call;
pub mod collaborator;
pub mod coordinator;
pub mod dialog;
pub mod error;
pub mod routing;
pub mod transport;

pub use call::{Call, CallEvent, CallState, EndReason, TeardownDecision};
pub use collaborator::{
    CallContext, Collaborator, CollaboratorDecision, CollaboratorRegistry, StaticMediaCollaborator,
};
pub use coordinator::{CallRecord, CoordinatorEvent, SessionCoordinator};
pub use error::{Result, SessionError, TimeoutError};
pub use routing::{Destination, DestinationKind, DialPlan};
pub use transport::{SipTransport, TransportEvent};
