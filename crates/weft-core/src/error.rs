//! Error types for weft

use thiserror::Error;

use crate::{ConnectionId, ContactId};

/// Core weft errors
///
/// Liveness failures are deliberately absent: a peer that stops answering is
/// reported as an `ack_timeout` event, never as an error value.
#[derive(Error, Debug)]
pub enum WeftError {
    // Precondition violations
    #[error("Invalid topic name: {0:?}")]
    InvalidTopic(String),

    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not initialized: {0}")]
    NotInitialized(&'static str),

    #[error("Already connected to {0}")]
    AlreadyConnected(String),

    // Stale references
    #[error("No agent data is available yet")]
    NotYetAvailable,

    #[error("Contact {0} no longer exists")]
    ContactNotFound(ContactId),

    #[error("Connection {connection} for contact {contact} no longer exists")]
    ConnectionNotFound {
        contact: ContactId,
        connection: ConnectionId,
    },

    // Wire and transport errors
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Frame too large: {size} > {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Transport closed")]
    TransportClosed,
}

impl WeftError {
    /// True for misses caused by snapshot churn; callers are expected to
    /// ignore these or retry against a fresher snapshot.
    pub fn is_stale_reference(&self) -> bool {
        matches!(
            self,
            WeftError::NotYetAvailable
                | WeftError::ContactNotFound(_)
                | WeftError::ConnectionNotFound { .. }
        )
    }
}

/// Result type for weft operations
pub type WeftResult<T> = Result<T, WeftError>;
