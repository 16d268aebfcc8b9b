//! Standard transition graphs

use std::sync::{Arc, OnceLock};

use weft_core::{AgentEvent, AvailabilityState, ContactEvent, ContactState, RoutingState};

use crate::graph::{EventGraph, StateMatch};

pub type RoutingGraph = EventGraph<RoutingState, AgentEvent>;
pub type AvailabilityGraph = EventGraph<AvailabilityState, AgentEvent>;
pub type ContactGraph = EventGraph<ContactState, ContactEvent>;

/// The three graphs the snapshot engine consults
#[derive(Clone, Debug)]
pub struct StandardGraphs {
    pub routing: RoutingGraph,
    pub availability: AvailabilityGraph,
    pub contact: ContactGraph,
}

impl StandardGraphs {
    pub fn new() -> Self {
        StandardGraphs {
            routing: routing_graph(),
            availability: availability_graph(),
            contact: contact_graph(),
        }
    }

    /// Process-wide instance, built on first use
    pub fn shared() -> Arc<StandardGraphs> {
        static GRAPHS: OnceLock<Arc<StandardGraphs>> = OnceLock::new();
        Arc::clone(GRAPHS.get_or_init(|| Arc::new(StandardGraphs::new())))
    }
}

impl Default for StandardGraphs {
    fn default() -> Self {
        Self::new()
    }
}

pub fn routing_graph() -> RoutingGraph {
    EventGraph::new()
        .associate(StateMatch::Any, RoutingState::Routable, AgentEvent::Routable)
        .associate(StateMatch::Any, RoutingState::NotRoutable, AgentEvent::NotRoutable)
        .associate(StateMatch::Any, RoutingState::Offline, AgentEvent::Offline)
}

pub fn availability_graph() -> AvailabilityGraph {
    EventGraph::new()
        .associate(
            StateMatch::Any,
            StateMatch::Set(AvailabilityState::error_states()),
            AgentEvent::Error,
        )
        .associate(
            StateMatch::Any,
            AvailabilityState::AfterCallWork,
            AgentEvent::AfterCallWork,
        )
}

/// Contact lifecycle graph
///
/// `contact::error` fires for every transition into `ContactState::Error`,
/// after any more specific match. Connecting to Error therefore publishes
/// `missed`, then `ended`, then `error`.
pub fn contact_graph() -> ContactGraph {
    EventGraph::new()
        .associate(StateMatch::Any, ContactState::Incoming, ContactEvent::Incoming)
        .associate(StateMatch::Any, ContactState::Pending, ContactEvent::Pending)
        .associate(StateMatch::Any, ContactState::Connecting, ContactEvent::Connecting)
        .associate(StateMatch::Any, ContactState::Connected, ContactEvent::Connected)
        .associate(ContactState::Connecting, ContactState::Error, ContactEvent::Missed)
        .associate(ContactState::Incoming, ContactState::Error, ContactEvent::Missed)
        .associate(StateMatch::Any, ContactState::Ended, ContactEvent::AfterCallWork)
        .associate(
            StateMatch::set(ContactState::ACTIVE),
            StateMatch::Set(ContactState::inactive()),
            ContactEvent::Ended,
        )
        .associate(StateMatch::Any, ContactState::Error, ContactEvent::Error)
        .associate(ContactState::Connecting, ContactState::Missed, ContactEvent::Missed)
}
