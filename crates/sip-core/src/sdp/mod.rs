//! Session Description Protocol support for audio calls.

pub mod answer;
pub mod parser;
pub mod types;

pub use answer::{build_answer, build_forwarded_offer, build_offer};
pub use parser::{parse_sdp, parse_sdp_line};
pub use types::{
    static_payload, Attribute, Connection, Direction, Fmtp, MediaDescription, Origin, RtpMap,
    SessionDescription, TELEPHONE_EVENT,
};
