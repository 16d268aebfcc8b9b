//! weft Bus - Local publish/subscribe
//!
//! This crate provides:
//! - Topic-keyed subscriptions with insertion-order delivery
//! - Catch-all subscriptions
//! - Disposable subscription handles
//! - Bridging of envelope streams into the bus

pub mod bus;
pub mod subscription;

pub use bus::*;
pub use subscription::*;
