//! Event definitions
//!
//! Every message that crosses a channel or the local bus is addressed by a
//! topic. Topics are split into closed families so that derived events are
//! exhaustively matchable, with an entity-scoped composite (event ⊗ contact)
//! and a free-form escape hatch for application traffic.

use std::fmt;
use std::str::FromStr;

use crate::{ContactId, WeftError, WeftResult};

/// Separator between namespace, event and scope in wire names
pub const TOPIC_SEPARATOR: &str = "::";

/// Protocol events exchanged between contexts
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProtocolEvent {
    Synchronize,
    Acknowledge,
    AckTimeout,
    Log,
    Configure,
    Broadcast,
    Terminate,
    Terminated,
    Close,
    AuthFail,
    AccessDenied,
}

impl ProtocolEvent {
    pub const ALL: [ProtocolEvent; 11] = [
        ProtocolEvent::Synchronize,
        ProtocolEvent::Acknowledge,
        ProtocolEvent::AckTimeout,
        ProtocolEvent::Log,
        ProtocolEvent::Configure,
        ProtocolEvent::Broadcast,
        ProtocolEvent::Terminate,
        ProtocolEvent::Terminated,
        ProtocolEvent::Close,
        ProtocolEvent::AuthFail,
        ProtocolEvent::AccessDenied,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProtocolEvent::Synchronize => "synchronize",
            ProtocolEvent::Acknowledge => "acknowledge",
            ProtocolEvent::AckTimeout => "ack_timeout",
            ProtocolEvent::Log => "log",
            ProtocolEvent::Configure => "configure",
            ProtocolEvent::Broadcast => "broadcast",
            ProtocolEvent::Terminate => "terminate",
            ProtocolEvent::Terminated => "terminated",
            ProtocolEvent::Close => "close",
            ProtocolEvent::AuthFail => "auth_fail",
            ProtocolEvent::AccessDenied => "access_denied",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.name() == name)
    }
}

/// Agent-level events derived from snapshots
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AgentEvent {
    Init,
    Update,
    Refresh,
    Routable,
    NotRoutable,
    Offline,
    Error,
    AfterCallWork,
    StateChange,
}

impl AgentEvent {
    pub const ALL: [AgentEvent; 9] = [
        AgentEvent::Init,
        AgentEvent::Update,
        AgentEvent::Refresh,
        AgentEvent::Routable,
        AgentEvent::NotRoutable,
        AgentEvent::Offline,
        AgentEvent::Error,
        AgentEvent::AfterCallWork,
        AgentEvent::StateChange,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AgentEvent::Init => "agent::init",
            AgentEvent::Update => "agent::update",
            AgentEvent::Refresh => "agent::refresh",
            AgentEvent::Routable => "agent::routable",
            AgentEvent::NotRoutable => "agent::not_routable",
            AgentEvent::Offline => "agent::offline",
            AgentEvent::Error => "agent::error",
            AgentEvent::AfterCallWork => "agent::acw",
            AgentEvent::StateChange => "agent::statechange",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.name() == name)
    }
}

/// Per-contact lifecycle events
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContactEvent {
    Init,
    Refresh,
    Destroyed,
    Incoming,
    Pending,
    Connecting,
    Connected,
    Missed,
    AfterCallWork,
    Ended,
    Error,
    View,
}

impl ContactEvent {
    pub const ALL: [ContactEvent; 12] = [
        ContactEvent::Init,
        ContactEvent::Refresh,
        ContactEvent::Destroyed,
        ContactEvent::Incoming,
        ContactEvent::Pending,
        ContactEvent::Connecting,
        ContactEvent::Connected,
        ContactEvent::Missed,
        ContactEvent::AfterCallWork,
        ContactEvent::Ended,
        ContactEvent::Error,
        ContactEvent::View,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ContactEvent::Init => "contact::init",
            ContactEvent::Refresh => "contact::refresh",
            ContactEvent::Destroyed => "contact::destroyed",
            ContactEvent::Incoming => "contact::incoming",
            ContactEvent::Pending => "contact::pending",
            ContactEvent::Connecting => "contact::connecting",
            ContactEvent::Connected => "contact::connected",
            ContactEvent::Missed => "contact::missed",
            ContactEvent::AfterCallWork => "contact::acw",
            ContactEvent::Ended => "contact::ended",
            ContactEvent::Error => "contact::error",
            ContactEvent::View => "contact::view",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.name() == name)
    }
}

/// Address of a message on a bus or channel direction
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    Protocol(ProtocolEvent),
    Agent(AgentEvent),
    Contact(ContactEvent),
    /// Contact event scoped to a single contact: `<event>::<contact id>`
    Scoped(ContactEvent, ContactId),
    /// Application-defined topic with no reserved meaning
    ///
    /// Built as-is, without validation. `Topic::custom` rejects blank names
    /// and resolves reserved ones; buses ignore blank names.
    Custom(String),
}

impl Topic {
    /// Entity-scoped topic for one contact
    pub fn scoped(event: ContactEvent, contact_id: impl Into<ContactId>) -> Self {
        Topic::Scoped(event, contact_id.into())
    }

    /// Free-form topic; reserved names resolve to their canonical variant
    pub fn custom(name: impl AsRef<str>) -> WeftResult<Self> {
        name.as_ref().parse()
    }

    /// The scoped contact, if any
    pub fn contact_id(&self) -> Option<&ContactId> {
        match self {
            Topic::Scoped(_, id) => Some(id),
            _ => None,
        }
    }

    /// Canonical wire name
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Protocol(e) => f.write_str(e.name()),
            Topic::Agent(e) => f.write_str(e.name()),
            Topic::Contact(e) => f.write_str(e.name()),
            Topic::Scoped(e, id) => write!(f, "{}{}{}", e.name(), TOPIC_SEPARATOR, id),
            Topic::Custom(name) => f.write_str(name),
        }
    }
}

impl FromStr for Topic {
    type Err = WeftError;

    fn from_str(name: &str) -> WeftResult<Self> {
        if name.trim().is_empty() {
            return Err(WeftError::InvalidTopic(name.to_string()));
        }
        if let Some(e) = ProtocolEvent::from_name(name) {
            return Ok(Topic::Protocol(e));
        }
        if let Some(e) = AgentEvent::from_name(name) {
            return Ok(Topic::Agent(e));
        }
        if let Some(e) = ContactEvent::from_name(name) {
            return Ok(Topic::Contact(e));
        }
        for event in ContactEvent::ALL {
            let scope = name
                .strip_prefix(event.name())
                .and_then(|rest| rest.strip_prefix(TOPIC_SEPARATOR));
            match scope {
                Some("") => return Err(WeftError::InvalidTopic(name.to_string())),
                Some(id) => return Ok(Topic::Scoped(event, ContactId::new(id))),
                None => {}
            }
        }
        Ok(Topic::Custom(name.to_string()))
    }
}

impl From<ProtocolEvent> for Topic {
    fn from(e: ProtocolEvent) -> Self {
        Topic::Protocol(e)
    }
}

impl From<AgentEvent> for Topic {
    fn from(e: AgentEvent) -> Self {
        Topic::Agent(e)
    }
}

impl From<ContactEvent> for Topic {
    fn from(e: ContactEvent) -> Self {
        Topic::Contact(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_reserved_names_parse_to_families() {
        assert_eq!(
            "acknowledge".parse::<Topic>().unwrap(),
            Topic::Protocol(ProtocolEvent::Acknowledge)
        );
        assert_eq!(
            "agent::statechange".parse::<Topic>().unwrap(),
            Topic::Agent(AgentEvent::StateChange)
        );
        assert_eq!(
            "contact::acw".parse::<Topic>().unwrap(),
            Topic::Contact(ContactEvent::AfterCallWork)
        );
    }

    #[test]
    fn test_scoped_topic_name() {
        let topic = Topic::scoped(ContactEvent::Destroyed, "abc-123");
        assert_eq!(topic.to_string(), "contact::destroyed::abc-123");
        assert_eq!(topic.name().parse::<Topic>().unwrap(), topic);
        assert_eq!(topic.contact_id(), Some(&ContactId::new("abc-123")));
    }

    #[test]
    fn test_scope_keeps_separators_in_id() {
        let topic: Topic = "contact::refresh::a::b".parse().unwrap();
        assert_eq!(topic, Topic::scoped(ContactEvent::Refresh, "a::b"));
    }

    #[test]
    fn test_invalid_topics() {
        assert!("".parse::<Topic>().is_err());
        assert!("   ".parse::<Topic>().is_err());
        assert!("contact::init::".parse::<Topic>().is_err());
    }

    #[test]
    fn test_custom_topic_canonicalizes() {
        assert_eq!(
            Topic::custom("close").unwrap(),
            Topic::Protocol(ProtocolEvent::Close)
        );
        assert_eq!(
            Topic::custom("webSocket::send").unwrap(),
            Topic::Custom("webSocket::send".into())
        );
        // A prefix of a reserved name is not the reserved name
        assert_eq!(
            Topic::custom("contact::initial").unwrap(),
            Topic::Custom("contact::initial".into())
        );
    }

    proptest! {
        #[test]
        fn prop_scoped_names_roundtrip(id in "[A-Za-z0-9:-]{1,24}", idx in 0usize..ContactEvent::ALL.len()) {
            let topic = Topic::scoped(ContactEvent::ALL[idx], id.as_str());
            prop_assert_eq!(topic.to_string().parse::<Topic>().unwrap(), topic);
        }
    }
}
