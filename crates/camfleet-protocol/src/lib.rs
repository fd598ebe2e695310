//! Camera server wire contract.
//!
//! Commands travel as one JSON document per datagram, each stamped with a
//! protocol version and a per-server sequence number. Downloads use a small
//! fixed binary header over a stream connection.

pub mod command;
pub mod types;
pub mod wire;

pub use command::Command;
pub use types::*;
pub use wire::{ErrorCode, Reply, Request, Response, PROTOCOL_VERSION};
