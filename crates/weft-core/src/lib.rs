//! weft Core - Fundamental types shared by every weft crate
//!
//! This crate defines:
//! - Identifiers (ContactId, ConnectionId)
//! - Event families and topics (ProtocolEvent, AgentEvent, ContactEvent, Topic)
//! - Agent and contact state enumerations
//! - The error taxonomy (WeftError)

pub mod error;
pub mod event;
pub mod id;
pub mod state;

pub use error::*;
pub use event::*;
pub use id::*;
pub use state::*;
