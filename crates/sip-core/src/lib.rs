//! SIP signaling primitives for the switchboard.
//!
//! - [`parser`] and [`types`]: decode and encode SIP requests/responses
//! - [`sdp`]: session descriptions, offers and answers
//! - [`negotiate`]: the order-preserving codec negotiator
//! - [`builder`]: outgoing request/response construction
//!
//! Everything here is stateless and reentrant.

pub mod builder;
pub mod error;
pub mod negotiate;
pub mod parser;
pub mod sdp;
pub mod types;

pub use error::{NegotiationError, ParseError, Result};
pub use negotiate::{CodecNegotiator, DeviceProfile};
pub use parser::parse_message;

/// Content type of SDP bodies
pub const CONTENT_TYPE_SDP: &str = "application/sdp";

/// Commonly used items
pub mod prelude {
    pub use crate::builder::{new_branch, new_call_id, new_tag, SimpleRequestBuilder, SimpleResponseBuilder};
    pub use crate::error::{NegotiationError, ParseError};
    pub use crate::negotiate::{filter_for_device, CodecNegotiator, DeviceProfile};
    pub use crate::parser::parse_message;
    pub use crate::sdp::{build_answer, build_offer, parse_sdp, SessionDescription};
    pub use crate::types::*;
    pub use crate::CONTENT_TYPE_SDP;
}
