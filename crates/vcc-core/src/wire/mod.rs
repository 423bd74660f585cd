//! # VCC Wire Protocol
//!
//! Envelope types, the positional JSON codec, and the fixed set of request
//! and event paths spoken between a position and a node.

pub mod message;
pub mod paths;

pub use message::{Control, Event, Method, Payload, Request, Response, WireError, WireMessage};
