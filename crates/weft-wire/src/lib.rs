//! weft Wire - Envelope format
//!
//! This crate implements the unit of exchange between contexts:
//! - Envelope `{event, data}`
//! - Channel directions
//! - Newline-delimited JSON framing for byte transports

pub mod envelope;
pub mod frame;

pub use envelope::*;
pub use frame::*;
