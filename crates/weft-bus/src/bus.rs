//! Topic-keyed event bus
//!
//! Delivery is synchronous and follows registration order. The registry lock
//! is released before any handler runs, so handlers may subscribe,
//! unsubscribe, or trigger again from inside a delivery pass.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, warn};

use weft_core::Topic;
use weft_wire::{Envelope, EnvelopeHandler};

use crate::subscription::{CatchAllHandler, Registry, Slot, SlotKey, Subscription, TopicHandler};

/// Bus configuration
#[derive(Clone, Debug, Default)]
pub struct BusConfig {
    /// Log every trigger at debug level
    pub log_events: bool,
}

/// Local publish/subscribe registry
///
/// Cloning yields another handle onto the same registry.
#[derive(Clone)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
    config: BusConfig,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    pub fn with_config(config: BusConfig) -> Self {
        EventBus {
            registry: Arc::new(Mutex::new(Registry::default())),
            config,
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Append a handler to the end of the topic's sequence
    pub fn subscribe<F>(&self, topic: impl Into<Topic>, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribe_with(topic, move |_, payload| handler(payload))
    }

    /// Like `subscribe`, but the handler also receives its own subscription
    ///
    /// A blank topic name is never registered; the returned handle is inactive.
    pub fn subscribe_with<F>(&self, topic: impl Into<Topic>, handler: F) -> Subscription
    where
        F: Fn(&Subscription, &Value) + Send + Sync + 'static,
    {
        let name = topic.into().to_string();
        let sub = Subscription::new(SlotKey::Topic(name.clone()), &self.registry);
        if is_blank(&name) {
            warn!(topic = ?name, "Ignoring subscription to a blank topic");
            sub.deactivate();
            return sub;
        }
        let handler: TopicHandler = Arc::new(handler);
        self.registry.lock().push_topic(
            name,
            Slot {
                sub: sub.clone(),
                handler,
            },
        );
        sub
    }

    /// Handler for every topic, run after the topic's own subscribers
    pub fn subscribe_all<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Subscription, &Topic, &Value) + Send + Sync + 'static,
    {
        let sub = Subscription::new(SlotKey::All, &self.registry);
        let handler: CatchAllHandler = Arc::new(handler);
        self.registry.lock().push_all(Slot {
            sub: sub.clone(),
            handler,
        });
        sub
    }

    pub fn unsubscribe(&self, subscription: &Subscription) {
        subscription.unsubscribe();
    }

    /// Deliver `payload` to every subscriber of `topic`
    ///
    /// Returns the number of handlers that ran to completion. A panicking
    /// handler is logged and skipped. A blank topic name reaches nobody.
    pub fn trigger(&self, topic: &Topic, payload: &Value) -> usize {
        let name = topic.to_string();
        if is_blank(&name) {
            warn!(topic = ?name, "Ignoring trigger of a blank topic");
            return 0;
        }
        let (targets, catch_all) = {
            let registry = self.registry.lock();
            (registry.topic_handlers(&name), registry.catch_all_handlers())
        };

        if self.config.log_events {
            debug!(
                topic = %name,
                subscribers = targets.len(),
                catch_all = catch_all.len(),
                "Triggering event"
            );
        }

        let mut delivered = 0;
        for (sub, handler) in &targets {
            if !sub.is_active() {
                continue;
            }
            if isolate(&name, sub, || handler(sub, payload)) {
                delivered += 1;
            }
        }
        for (sub, handler) in &catch_all {
            if !sub.is_active() {
                continue;
            }
            if isolate(&name, sub, || handler(sub, topic, payload)) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Handler that triggers each received envelope on this bus
    pub fn bridge(&self) -> EnvelopeHandler {
        let bus = self.clone();
        Arc::new(move |envelope: &Envelope| match envelope.topic() {
            Ok(topic) => {
                bus.trigger(&topic, &envelope.data);
            }
            Err(e) => warn!(event = %envelope.event, error = %e, "Dropping envelope"),
        })
    }

    /// Subscriptions currently registered for `topic`, in delivery order
    pub fn subscriptions(&self, topic: &Topic) -> Vec<Subscription> {
        self.registry.lock().subscriptions(&topic.to_string())
    }

    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.subscriptions(topic).len()
    }

    /// Number of topics with at least one subscriber
    pub fn topic_count(&self) -> usize {
        self.registry.lock().topic_count()
    }

    /// Remove every subscription; outstanding handles become inert
    pub fn unsubscribe_all(&self) {
        self.registry.lock().clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn is_blank(name: &str) -> bool {
    name.trim().is_empty()
}

fn isolate(topic: &str, sub: &Subscription, call: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(()) => true,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(topic, subscription = sub.id().0, %reason, "Event handler panicked");
            false
        }
    }
}
