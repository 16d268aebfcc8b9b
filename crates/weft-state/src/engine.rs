//! Snapshot diff engine
//!
//! Accepts successive agent snapshots and publishes the events implied by
//! each change on the bus. Order of publication within one `accept`:
//!
//! 1. `agent::init` (first snapshot only)
//! 2. `agent::refresh`
//! 3. routing graph events, if the routing state changed
//! 4. `agent::statechange` then availability graph events, if the
//!    availability state changed
//! 5. per added contact: `contact::init`, lifecycle events, refresh
//! 6. per removed contact: `contact::destroyed`, then its scoped
//!    subscriptions are dropped
//! 7. per common contact: lifecycle events if its state changed, refresh

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tracing::{debug, warn};

use weft_bus::{EventBus, Subscription};
use weft_core::{
    AgentEvent, AvailabilityState, ConnectionId, ContactEvent, ContactId, ContactState,
    RoutingState, Topic, WeftError, WeftResult,
};

use crate::diff::diff_contacts;
use crate::graphs::StandardGraphs;
use crate::snapshot::{AgentData, ConnectionData, ContactData};

/// Derives lifecycle events from consecutive snapshots
pub struct SnapshotDiffEngine {
    bus: EventBus,
    graphs: Arc<StandardGraphs>,
    current: RwLock<Option<Arc<AgentData>>>,
    update_sub: Mutex<Option<Subscription>>,
}

impl SnapshotDiffEngine {
    pub fn new(bus: EventBus, graphs: Arc<StandardGraphs>) -> Self {
        SnapshotDiffEngine {
            bus,
            graphs,
            current: RwLock::new(None),
            update_sub: Mutex::new(None),
        }
    }

    /// Engine that also consumes `agent::update` events from `bus`
    pub fn attach(bus: EventBus, graphs: Arc<StandardGraphs>) -> Arc<Self> {
        let engine = Arc::new(Self::new(bus.clone(), graphs));
        let weak: Weak<Self> = Arc::downgrade(&engine);
        let sub = bus.subscribe(AgentEvent::Update, move |payload| {
            let Some(engine) = weak.upgrade() else {
                return;
            };
            match serde_json::from_value::<AgentData>(payload.clone()) {
                Ok(data) => engine.accept(data),
                Err(e) => warn!(error = %e, "Dropping undecodable agent update"),
            }
        });
        *engine.update_sub.lock() = Some(sub);
        engine
    }

    /// Stop consuming `agent::update`
    pub fn detach(&self) {
        if let Some(sub) = self.update_sub.lock().take() {
            sub.unsubscribe();
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Replace the current snapshot and publish everything it implies
    pub fn accept(&self, data: AgentData) {
        let new = Arc::new(data);
        let old = self.current.write().replace(Arc::clone(&new));
        self.publish(old.as_deref(), &new);
    }

    fn publish(&self, old: Option<&AgentData>, new: &AgentData) {
        let agent = serde_json::to_value(new).unwrap_or_else(|e| {
            warn!(error = %e, "Snapshot did not encode");
            Value::Null
        });

        if old.is_none() {
            debug!("First agent snapshot");
            self.emit(AgentEvent::Init, &agent);
        }
        self.emit(AgentEvent::Refresh, &agent);

        let old_routing = old.map_or(RoutingState::Init, AgentData::routing_state);
        let new_routing = new.routing_state();
        if old_routing != new_routing {
            for event in self.graphs.routing.associations(&old_routing, &new_routing) {
                self.emit(event, &agent);
            }
        }

        let old_availability =
            old.map_or(AvailabilityState::Init, |o| o.availability_state().clone());
        let new_availability = new.availability_state();
        if &old_availability != new_availability {
            self.emit(
                AgentEvent::StateChange,
                &json!({
                    "oldState": old_availability.name(),
                    "newState": new_availability.name(),
                }),
            );
            for event in self
                .graphs
                .availability
                .associations(&old_availability, new_availability)
            {
                self.emit(event, &agent);
            }
        }

        let diff = diff_contacts(old, new);
        for contact in &diff.added {
            self.emit(ContactEvent::Init, &contact_ref(&contact.contact_id));
            self.contact_update(&contact.contact_id, ContactState::Init, contact.state());
        }
        for contact in &diff.removed {
            self.contact_destroyed(contact);
        }
        for (before, after) in &diff.common {
            self.contact_update(&after.contact_id, before.state(), after.state());
        }
    }

    fn contact_update(&self, id: &ContactId, old: ContactState, new: ContactState) {
        let payload = contact_ref(id);
        if old != new {
            for event in self.graphs.contact.associations(&old, &new) {
                self.emit(event, &payload);
                self.emit(Topic::scoped(event, id.clone()), &payload);
            }
        }
        self.emit(ContactEvent::Refresh, &payload);
        self.emit(Topic::scoped(ContactEvent::Refresh, id.clone()), &payload);
    }

    fn contact_destroyed(&self, contact: &ContactData) {
        let id = &contact.contact_id;
        let payload = serde_json::to_value(contact).unwrap_or_else(|_| contact_ref(id));
        self.emit(ContactEvent::Destroyed, &payload);
        self.emit(Topic::scoped(ContactEvent::Destroyed, id.clone()), &payload);

        let mut dropped = 0;
        for event in ContactEvent::ALL {
            for sub in self.bus.subscriptions(&Topic::scoped(event, id.clone())) {
                sub.unsubscribe();
                dropped += 1;
            }
        }
        debug!(contact = %id, dropped, "Contact destroyed");
    }

    fn emit(&self, topic: impl Into<Topic>, payload: &Value) {
        self.bus.trigger(&topic.into(), payload);
    }

    pub fn is_initialized(&self) -> bool {
        self.current.read().is_some()
    }

    /// The latest snapshot
    pub fn current(&self) -> WeftResult<Arc<AgentData>> {
        self.current.read().clone().ok_or(WeftError::NotYetAvailable)
    }

    pub fn contact(&self, id: &ContactId) -> WeftResult<ContactData> {
        self.current()?
            .contact(id)
            .cloned()
            .ok_or_else(|| WeftError::ContactNotFound(id.clone()))
    }

    pub fn connection(
        &self,
        contact: &ContactId,
        connection: &ConnectionId,
    ) -> WeftResult<ConnectionData> {
        self.contact(contact)?
            .connection(connection)
            .cloned()
            .ok_or_else(|| WeftError::ConnectionNotFound {
                contact: contact.clone(),
                connection: connection.clone(),
            })
    }

    pub fn local_timestamp(&self) -> WeftResult<u64> {
        Ok(self.current()?.snapshot.local_timestamp)
    }

    pub fn skew(&self) -> WeftResult<i64> {
        Ok(self.current()?.snapshot.skew)
    }
}

fn contact_ref(id: &ContactId) -> Value {
    json!({ "contactId": id })
}
