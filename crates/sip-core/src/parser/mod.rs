//! Wire-format decoding for SIP messages.

pub mod message;

pub use message::parse_message;
