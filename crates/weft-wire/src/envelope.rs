//! Envelope definition

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use weft_core::{ProtocolEvent, Topic, WeftResult};

/// Topic-tagged message exchanged over a channel
///
/// Envelopes are directionless; direction is a property of the channel half
/// that carried them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(topic: &Topic, data: Value) -> Self {
        Envelope {
            event: topic.to_string(),
            data,
        }
    }

    /// Envelope with no payload
    pub fn signal(topic: &Topic) -> Self {
        Self::new(topic, Value::Null)
    }

    /// Wrap an envelope as the payload of a `broadcast`
    pub fn broadcast(inner: Envelope) -> Self {
        Envelope {
            event: ProtocolEvent::Broadcast.name().to_string(),
            data: serde_json::json!({ "event": inner.event, "data": inner.data }),
        }
    }

    /// Parse the event name into a topic
    pub fn topic(&self) -> WeftResult<Topic> {
        self.event.parse()
    }

    pub fn is(&self, topic: &Topic) -> bool {
        self.event == topic.to_string()
    }
}

/// Callback that receives envelopes, shared between registries
pub type EnvelopeHandler = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// One of the two directions of a channel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Towards the context that owns the authoritative state
    Upstream,
    /// Towards the embedding or consuming context
    Downstream,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Upstream => Direction::Downstream,
            Direction::Downstream => Direction::Upstream,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upstream => f.write_str("upstream"),
            Direction::Downstream => f.write_str("downstream"),
        }
    }
}
