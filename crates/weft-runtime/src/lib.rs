//! weft Runtime - Context orchestration
//!
//! This crate ties the lower layers together:
//! - `Core`: one explicit context per process (bus, snapshot engine, upstream channel)
//! - `KeepaliveManager`: synchronize/acknowledge liveness supervision
//! - Configuration with humantime durations
//! - Forwarding of log entries received from other contexts
//! - Tracing subscriber setup

pub mod config;
pub mod context;
pub mod keepalive;
pub mod logging;
pub mod telemetry;

pub use config::*;
pub use context::*;
pub use keepalive::*;
pub use logging::*;
pub use telemetry::*;
