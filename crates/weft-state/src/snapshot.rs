//! Agent snapshot model
//!
//! Field names follow the upstream JSON (`camelCase`). Fields this crate does
//! not interpret are kept in `extra` so that snapshots round-trip unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use weft_core::{AvailabilityState, ConnectionId, ContactId, ContactState, RoutingState};

/// Complete point-in-time view of an agent
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentData {
    pub snapshot: AgentSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSnapshot {
    pub state: AgentStateData,
    #[serde(default)]
    pub contacts: Vec<ContactData>,
    /// Local clock reading (ms since epoch) when the snapshot was taken
    #[serde(default)]
    pub local_timestamp: u64,
    /// Local minus server clock, in ms
    #[serde(default)]
    pub skew: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentStateData {
    /// Availability state
    pub name: AvailabilityState,
    /// Routing state
    #[serde(rename = "type")]
    pub routing: RoutingState,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactData {
    pub contact_id: ContactId,
    pub state: ContactStateData,
    #[serde(default)]
    pub connections: Vec<ConnectionData>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContactStateData {
    #[serde(rename = "type")]
    pub kind: ContactState,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionData {
    pub connection_id: ConnectionId,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentData {
    /// Minimal snapshot with no contacts
    pub fn new(availability: impl Into<AvailabilityState>, routing: RoutingState) -> Self {
        AgentData {
            snapshot: AgentSnapshot {
                state: AgentStateData {
                    name: availability.into(),
                    routing,
                    extra: Map::new(),
                },
                contacts: Vec::new(),
                local_timestamp: 0,
                skew: 0,
                extra: Map::new(),
            },
            configuration: None,
        }
    }

    pub fn with_contact(mut self, contact: ContactData) -> Self {
        self.snapshot.contacts.push(contact);
        self
    }

    pub fn with_timestamp(mut self, local_timestamp: u64, skew: i64) -> Self {
        self.snapshot.local_timestamp = local_timestamp;
        self.snapshot.skew = skew;
        self
    }

    pub fn routing_state(&self) -> RoutingState {
        self.snapshot.state.routing
    }

    pub fn availability_state(&self) -> &AvailabilityState {
        &self.snapshot.state.name
    }

    pub fn contact(&self, id: &ContactId) -> Option<&ContactData> {
        self.snapshot.contacts.iter().find(|c| &c.contact_id == id)
    }
}

impl ContactData {
    pub fn new(id: impl Into<ContactId>, state: ContactState) -> Self {
        ContactData {
            contact_id: id.into(),
            state: ContactStateData {
                kind: state,
                extra: Map::new(),
            },
            connections: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_connection(mut self, id: impl Into<ConnectionId>) -> Self {
        self.connections.push(ConnectionData {
            connection_id: id.into(),
            extra: Map::new(),
        });
        self
    }

    pub fn state(&self) -> ContactState {
        self.state.kind
    }

    pub fn connection(&self, id: &ConnectionId) -> Option<&ConnectionData> {
        self.connections.iter().find(|c| &c.connection_id == id)
    }
}
