//! Agent and contact state enumerations
//!
//! These are the raw states carried by snapshots. Semantic events are derived
//! from transitions between them, never from the states themselves.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Routing type of the agent state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingState {
    /// Pseudo-state before the first snapshot
    Init,
    Routable,
    NotRoutable,
    Offline,
    /// A routing type this version does not know about
    #[serde(other)]
    Unknown,
}

impl RoutingState {
    /// Every known state, excluding `Unknown`
    pub const ALL: [RoutingState; 4] = [
        RoutingState::Init,
        RoutingState::Routable,
        RoutingState::NotRoutable,
        RoutingState::Offline,
    ];
}

/// System error states an agent can be placed in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AgentErrorKind {
    Error,
    AgentHungUp,
    BadAddressAgent,
    BadAddressCustomer,
    Default,
    FailedConnectAgent,
    FailedConnectCustomer,
    LineEngagedAgent,
    LineEngagedCustomer,
    MissedCallAgent,
    MissedCallCustomer,
    MultipleCcpWindows,
    RealtimeCommunicationError,
}

impl AgentErrorKind {
    pub const ALL: [AgentErrorKind; 13] = [
        AgentErrorKind::Error,
        AgentErrorKind::AgentHungUp,
        AgentErrorKind::BadAddressAgent,
        AgentErrorKind::BadAddressCustomer,
        AgentErrorKind::Default,
        AgentErrorKind::FailedConnectAgent,
        AgentErrorKind::FailedConnectCustomer,
        AgentErrorKind::LineEngagedAgent,
        AgentErrorKind::LineEngagedCustomer,
        AgentErrorKind::MissedCallAgent,
        AgentErrorKind::MissedCallCustomer,
        AgentErrorKind::MultipleCcpWindows,
        AgentErrorKind::RealtimeCommunicationError,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AgentErrorKind::Error => "Error",
            AgentErrorKind::AgentHungUp => "AgentHungUp",
            AgentErrorKind::BadAddressAgent => "BadAddressAgent",
            AgentErrorKind::BadAddressCustomer => "BadAddressCustomer",
            AgentErrorKind::Default => "Default",
            AgentErrorKind::FailedConnectAgent => "FailedConnectAgent",
            AgentErrorKind::FailedConnectCustomer => "FailedConnectCustomer",
            AgentErrorKind::LineEngagedAgent => "LineEngagedAgent",
            AgentErrorKind::LineEngagedCustomer => "LineEngagedCustomer",
            AgentErrorKind::MissedCallAgent => "MissedCallAgent",
            AgentErrorKind::MissedCallCustomer => "MissedCallCustomer",
            AgentErrorKind::MultipleCcpWindows => "MultipleCcpWindows",
            AgentErrorKind::RealtimeCommunicationError => "RealtimeCommunicationError",
        }
    }
}

/// Availability state of the agent, keyed by state name
///
/// System states have dedicated variants; operator-defined states
/// ("Available", "Lunch", ...) are carried verbatim in `Named`. A name that
/// is not a JSON string decodes to `Named` holding its JSON text.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum AvailabilityState {
    /// Pseudo-state before the first snapshot
    Init,
    Busy,
    AfterCallWork,
    CallingCustomer,
    Dialing,
    Joining,
    PendingAvailable,
    PendingBusy,
    Error(AgentErrorKind),
    Named(String),
}

impl AvailabilityState {
    pub fn name(&self) -> &str {
        match self {
            AvailabilityState::Init => "Init",
            AvailabilityState::Busy => "Busy",
            AvailabilityState::AfterCallWork => "AfterCallWork",
            AvailabilityState::CallingCustomer => "CallingCustomer",
            AvailabilityState::Dialing => "Dialing",
            AvailabilityState::Joining => "Joining",
            AvailabilityState::PendingAvailable => "PendingAvailable",
            AvailabilityState::PendingBusy => "PendingBusy",
            AvailabilityState::Error(kind) => kind.name(),
            AvailabilityState::Named(name) => name,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, AvailabilityState::Error(_))
    }

    /// Every system error state
    pub fn error_states() -> Vec<AvailabilityState> {
        AgentErrorKind::ALL
            .into_iter()
            .map(AvailabilityState::Error)
            .collect()
    }
}

impl From<String> for AvailabilityState {
    fn from(name: String) -> Self {
        match name.as_str() {
            "Init" => AvailabilityState::Init,
            "Busy" => AvailabilityState::Busy,
            "AfterCallWork" => AvailabilityState::AfterCallWork,
            "CallingCustomer" => AvailabilityState::CallingCustomer,
            "Dialing" => AvailabilityState::Dialing,
            "Joining" => AvailabilityState::Joining,
            "PendingAvailable" => AvailabilityState::PendingAvailable,
            "PendingBusy" => AvailabilityState::PendingBusy,
            other => match AgentErrorKind::ALL.into_iter().find(|k| k.name() == other) {
                Some(kind) => AvailabilityState::Error(kind),
                None => AvailabilityState::Named(name),
            },
        }
    }
}

impl<'de> Deserialize<'de> for AvailabilityState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(name) => AvailabilityState::from(name),
            other => AvailabilityState::Named(other.to_string()),
        })
    }
}

impl From<&str> for AvailabilityState {
    fn from(name: &str) -> Self {
        AvailabilityState::from(name.to_string())
    }
}

impl From<AvailabilityState> for String {
    fn from(state: AvailabilityState) -> Self {
        state.name().to_string()
    }
}

impl fmt::Display for AvailabilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Contact state type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactState {
    /// Pseudo-state of a contact that was not in the previous snapshot
    Init,
    Incoming,
    Pending,
    Connecting,
    Connected,
    Missed,
    Error,
    Ended,
    Rejected,
    Paused,
    /// A state this version does not know about
    #[serde(other)]
    Unknown,
}

impl ContactState {
    /// Every known state, excluding `Unknown`
    pub const ALL: [ContactState; 10] = [
        ContactState::Init,
        ContactState::Incoming,
        ContactState::Pending,
        ContactState::Connecting,
        ContactState::Connected,
        ContactState::Missed,
        ContactState::Error,
        ContactState::Ended,
        ContactState::Rejected,
        ContactState::Paused,
    ];

    /// States in which a contact is still live
    pub const ACTIVE: [ContactState; 4] = [
        ContactState::Incoming,
        ContactState::Pending,
        ContactState::Connecting,
        ContactState::Connected,
    ];

    pub fn is_active(self) -> bool {
        Self::ACTIVE.contains(&self)
    }

    /// Known states that are not active
    pub fn inactive() -> Vec<ContactState> {
        Self::ALL.into_iter().filter(|s| !s.is_active()).collect()
    }
}
