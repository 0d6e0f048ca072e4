//! The peer wire protocol (§4.1): handshake and the length-prefixed message
//! stream that follows it.

pub(crate) mod handshake;
pub(crate) mod message;

pub(crate) use handshake::Handshake;
pub(crate) use message::{Message, MessageCodec};
