//! SIP message model: start lines, headers, addresses and URIs.

pub mod address;
pub mod cseq;
pub mod header;
pub mod message;
pub mod method;
pub mod status;
pub mod uri;
pub mod via;

pub use address::NameAddr;
pub use cseq::CSeq;
pub use header::{Header, HeaderName};
pub use message::{HeaderAccess, Message, Request, Response, SIP_VERSION};
pub use method::Method;
pub use status::StatusCode;
pub use uri::{Param, SipUri};
pub use via::{Via, BRANCH_MAGIC_COOKIE};
