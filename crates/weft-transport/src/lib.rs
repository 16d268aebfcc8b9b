//! weft Transport - Moving envelopes between contexts
//!
//! This crate provides:
//! - The `Transport` capability consumed by channels
//! - In-memory, byte-stream and null transports
//! - `Channel`: a pair of directional transports with local registries

pub mod channel;
pub mod io;
pub mod memory;
pub mod transport;

pub use channel::*;
pub use io::*;
pub use memory::*;
pub use transport::*;
