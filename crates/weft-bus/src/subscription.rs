//! Subscription handles and the registry they point into

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;

use weft_core::Topic;

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique subscription identity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    fn next() -> Self {
        SubscriptionId(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handler for a single topic; receives its own subscription
pub type TopicHandler = Arc<dyn Fn(&Subscription, &Value) + Send + Sync>;

/// Handler for every topic
pub type CatchAllHandler = Arc<dyn Fn(&Subscription, &Topic, &Value) + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum SlotKey {
    Topic(String),
    All,
}

struct SubscriptionInner {
    id: SubscriptionId,
    key: SlotKey,
    active: AtomicBool,
    registry: Weak<Mutex<Registry>>,
}

/// Handle to a registered handler
///
/// Dropping the handle does not unsubscribe; only `unsubscribe` (or the
/// closure from `unsubscriber`) stops delivery. Unsubscribing is idempotent.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

impl Subscription {
    pub(crate) fn new(key: SlotKey, registry: &Arc<Mutex<Registry>>) -> Self {
        Subscription {
            inner: Arc::new(SubscriptionInner {
                id: SubscriptionId::next(),
                key,
                active: AtomicBool::new(true),
                registry: Arc::downgrade(registry),
            }),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.inner.id
    }

    /// Topic name, or `None` for a catch-all subscription
    pub fn topic(&self) -> Option<&str> {
        match &self.inner.key {
            SlotKey::Topic(name) => Some(name),
            SlotKey::All => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Stop delivery to this handler, including any delivery pass in progress
    pub fn unsubscribe(&self) {
        if !self.inner.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.inner.registry.upgrade() {
            registry.lock().remove(&self.inner.key, self.inner.id);
        }
    }

    /// Closure form of `unsubscribe`
    pub fn unsubscriber(&self) -> impl Fn() + Send + Sync + 'static {
        let sub = self.clone();
        move || sub.unsubscribe()
    }

    /// Mark inactive without touching the registry (registry lock is held)
    pub(crate) fn deactivate(&self) {
        self.inner.active.store(false, Ordering::Release);
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Subscription {}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.inner.id.0)
            .field("topic", &self.topic())
            .field("active", &self.is_active())
            .finish()
    }
}

pub(crate) struct Slot<H> {
    pub(crate) sub: Subscription,
    pub(crate) handler: H,
}

impl<H: Clone> Slot<H> {
    fn pair(&self) -> (Subscription, H) {
        (self.sub.clone(), self.handler.clone())
    }
}

/// Ordered handler tables
#[derive(Default)]
pub(crate) struct Registry {
    topics: HashMap<String, Vec<Slot<TopicHandler>>>,
    all: Vec<Slot<CatchAllHandler>>,
}

impl Registry {
    pub(crate) fn push_topic(&mut self, topic: String, slot: Slot<TopicHandler>) {
        self.topics.entry(topic).or_default().push(slot);
    }

    pub(crate) fn push_all(&mut self, slot: Slot<CatchAllHandler>) {
        self.all.push(slot);
    }

    pub(crate) fn remove(&mut self, key: &SlotKey, id: SubscriptionId) {
        match key {
            SlotKey::Topic(name) => {
                if let Some(slots) = self.topics.get_mut(name) {
                    slots.retain(|s| s.sub.id() != id);
                    if slots.is_empty() {
                        self.topics.remove(name);
                    }
                }
            }
            SlotKey::All => self.all.retain(|s| s.sub.id() != id),
        }
    }

    /// Copy of the handlers currently registered for `topic`
    pub(crate) fn topic_handlers(&self, topic: &str) -> Vec<(Subscription, TopicHandler)> {
        self.topics
            .get(topic)
            .map(|slots| slots.iter().map(Slot::pair).collect())
            .unwrap_or_default()
    }

    pub(crate) fn catch_all_handlers(&self) -> Vec<(Subscription, CatchAllHandler)> {
        self.all.iter().map(Slot::pair).collect()
    }

    pub(crate) fn subscriptions(&self, topic: &str) -> Vec<Subscription> {
        self.topics
            .get(topic)
            .map(|slots| slots.iter().map(|s| s.sub.clone()).collect())
            .unwrap_or_default()
    }

    pub(crate) fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub(crate) fn clear(&mut self) {
        for slot in self.topics.values().flatten() {
            slot.sub.deactivate();
        }
        for slot in &self.all {
            slot.sub.deactivate();
        }
        self.topics.clear();
        self.all.clear();
    }
}
