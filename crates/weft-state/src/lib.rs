//! weft State - Turning snapshots into events
//!
//! This crate implements the derived-event engine:
//! - Declarative transition graphs
//! - The standard routing, availability and contact graphs
//! - Agent snapshot model
//! - Contact diffing between consecutive snapshots
//! - `SnapshotDiffEngine`, which publishes the derived events on a bus

pub mod diff;
pub mod engine;
pub mod graph;
pub mod graphs;
pub mod snapshot;

pub use diff::*;
pub use engine::*;
pub use graph::*;
pub use graphs::*;
pub use snapshot::*;
