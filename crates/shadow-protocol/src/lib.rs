//! # shadow-protocol
//!
//! Vehicle shadow wire message types and codec.
//!
//! This crate defines the WebSocket RPC and HTTP discovery message formats.

pub mod codec;
pub mod messages;

pub use codec::*;
pub use messages::*;
