//! weft Test Harness
//!
//! Tools for exercising the messaging layer end to end:
//! - A scripted upstream peer that answers keepalive syncs
//! - A seeded snapshot fuzzer for the diff engine
//! - Integration scenarios wiring real cores to simulated peers

pub mod integration;
pub mod simulator;
pub mod snapshot_fuzzer;

pub use integration::*;
pub use simulator::*;
pub use snapshot_fuzzer::*;
