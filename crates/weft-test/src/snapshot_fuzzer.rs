//! Snapshot Fuzzer - Randomized checks for the diff engine
//!
//! Feeds seeded random snapshot sequences through a `SnapshotDiffEngine` and
//! verifies after every step:
//! - Contacts are partitioned into added, removed and common
//! - Each added contact gets exactly one `contact::init`, each removed one
//!   exactly one `contact::destroyed`
//! - Lifecycle events match the contact graph for the observed transitions
//! - Unchanged contacts produce only refresh events
//! - Scoped subscriptions of removed contacts are gone

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use weft_bus::{EventBus, Subscription};
use weft_core::{AgentEvent, ContactEvent, ContactId, ContactState, RoutingState, Topic};
use weft_state::{diff_contacts, AgentData, ContactData, SnapshotDiffEngine, StandardGraphs};

const ROUTING: [RoutingState; 3] = [
    RoutingState::Routable,
    RoutingState::NotRoutable,
    RoutingState::Offline,
];

const AVAILABILITY: [&str; 6] = [
    "Available",
    "Offline",
    "Busy",
    "AfterCallWork",
    "MissedCallAgent",
    "FailedConnectCustomer",
];

/// Fuzzer configuration
#[derive(Clone, Debug)]
pub struct SnapshotFuzzerConfig {
    /// Number of snapshots to feed
    pub steps: usize,
    /// Size of the contact id pool
    pub contact_pool: usize,
    /// Probability that a pool contact is present in a snapshot
    pub presence_prob: f64,
    /// Probability that a present contact keeps its previous state
    pub stay_prob: f64,
    /// Probability of resending the previous snapshot unchanged
    pub repeat_prob: f64,
    /// Random seed
    pub seed: u64,
}

impl Default for SnapshotFuzzerConfig {
    fn default() -> Self {
        SnapshotFuzzerConfig {
            steps: 500,
            contact_pool: 8,
            presence_prob: 0.5,
            stay_prob: 0.5,
            repeat_prob: 0.1,
            seed: 42,
        }
    }
}

impl SnapshotFuzzerConfig {
    /// Light fuzzing for quick tests
    pub fn light() -> Self {
        SnapshotFuzzerConfig {
            steps: 50,
            contact_pool: 4,
            ..Default::default()
        }
    }

    /// Many contacts with high churn
    pub fn churn() -> Self {
        SnapshotFuzzerConfig {
            steps: 1000,
            contact_pool: 32,
            presence_prob: 0.3,
            stay_prob: 0.1,
            repeat_prob: 0.0,
            seed: 7,
        }
    }
}

/// Outcome of a fuzzing run
#[derive(Clone, Debug, Default)]
pub struct FuzzReport {
    pub steps: usize,
    /// Every event published on the bus, scoped ones included
    pub events: usize,
    /// Unscoped contact lifecycle events
    pub lifecycle_events: usize,
    pub destroyed: usize,
    pub violations: Vec<String>,
}

impl FuzzReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Seeded snapshot sequence generator and checker
pub struct SnapshotFuzzer {
    config: SnapshotFuzzerConfig,
    rng: StdRng,
    graphs: Arc<StandardGraphs>,
}

impl SnapshotFuzzer {
    pub fn new(config: SnapshotFuzzerConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        SnapshotFuzzer {
            config,
            rng,
            graphs: StandardGraphs::shared(),
        }
    }

    /// Draw the next snapshot, using `previous` to keep some contacts stable
    pub fn next_snapshot(&mut self, previous: Option<&AgentData>) -> AgentData {
        if let Some(previous) = previous {
            if self.rng.gen_bool(self.config.repeat_prob) {
                return previous.clone();
            }
        }

        let routing = ROUTING[self.rng.gen_range(0..ROUTING.len())];
        let availability = AVAILABILITY[self.rng.gen_range(0..AVAILABILITY.len())];
        let mut data = AgentData::new(availability, routing).with_timestamp(
            self.rng.gen_range(1_600_000_000_000..1_700_000_000_000),
            self.rng.gen_range(-5_000..5_000),
        );

        for n in 0..self.config.contact_pool {
            if !self.rng.gen_bool(self.config.presence_prob) {
                continue;
            }
            let id = ContactId::new(format!("contact-{n}"));
            let kept = previous
                .and_then(|p| p.contact(&id))
                .map(ContactData::state)
                .filter(|_| self.rng.gen_bool(self.config.stay_prob));
            let state = kept.unwrap_or_else(|| self.random_state());
            data = data.with_contact(ContactData::new(id, state).with_connection(format!("conn-{n}").as_str()));
        }
        data
    }

    fn random_state(&mut self) -> ContactState {
        // Skip the Init pseudo-state
        let states = &ContactState::ALL[1..];
        states[self.rng.gen_range(0..states.len())]
    }

    /// Run the configured number of steps against a fresh bus and engine
    pub fn run(&mut self) -> FuzzReport {
        let bus = EventBus::new();
        let engine = SnapshotDiffEngine::new(bus.clone(), Arc::clone(&self.graphs));

        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _recorder = bus.subscribe_all(move |_, topic, _| sink.lock().push(topic.to_string()));

        let lifecycle: HashSet<String> = ContactEvent::ALL
            .into_iter()
            .filter(|e| {
                !matches!(
                    e,
                    ContactEvent::Init | ContactEvent::Refresh | ContactEvent::Destroyed
                )
            })
            .map(|e| e.name().to_string())
            .collect();

        let mut report = FuzzReport::default();
        let mut watchers: HashMap<ContactId, Subscription> = HashMap::new();
        let mut previous: Option<AgentData> = None;

        for step in 0..self.config.steps {
            let next = self.next_snapshot(previous.as_ref());

            if let Some(prev) = &previous {
                for contact in &prev.snapshot.contacts {
                    watchers.entry(contact.contact_id.clone()).or_insert_with(|| {
                        bus.subscribe(
                            Topic::scoped(ContactEvent::Refresh, contact.contact_id.clone()),
                            |_| {},
                        )
                    });
                }
            }

            seen.lock().clear();
            engine.accept(next.clone());
            let events = std::mem::take(&mut *seen.lock());

            report.steps += 1;
            report.events += events.len();
            let count = |name: &str| events.iter().filter(|e| e.as_str() == name).count();
            let lifecycle_seen = events.iter().filter(|e| lifecycle.contains(e.as_str())).count();
            report.lifecycle_events += lifecycle_seen;

            let diff = diff_contacts(previous.as_ref(), &next);
            let mut violations = Vec::new();
            let mut fail = |what: String| violations.push(format!("step {step}: {what}"));

            let expected_init = usize::from(previous.is_none());
            if count(AgentEvent::Init.name()) != expected_init {
                fail(format!("expected {expected_init} agent::init"));
            }
            if count(AgentEvent::Refresh.name()) != 1 {
                fail("expected exactly one agent::refresh".to_string());
            }
            if count(ContactEvent::Init.name()) != diff.added.len() {
                fail(format!("{} added, init count differs", diff.added.len()));
            }
            if count(ContactEvent::Destroyed.name()) != diff.removed.len() {
                fail(format!("{} removed, destroyed count differs", diff.removed.len()));
            }
            if count(ContactEvent::Refresh.name()) != diff.added.len() + diff.common.len() {
                fail("one contact::refresh per live contact expected".to_string());
            }

            let mut expected_lifecycle = 0;
            for contact in &diff.added {
                expected_lifecycle += self
                    .graphs
                    .contact
                    .associations(&ContactState::Init, &contact.state())
                    .len();
            }
            for (before, after) in &diff.common {
                if before.state() == after.state() {
                    for event in ContactEvent::ALL {
                        if event == ContactEvent::Refresh {
                            continue;
                        }
                        let scoped = Topic::scoped(event, after.contact_id.clone()).to_string();
                        if count(&scoped) > 0 {
                            fail(format!("unchanged {} emitted {scoped}", after.contact_id));
                        }
                    }
                } else {
                    expected_lifecycle += self
                        .graphs
                        .contact
                        .associations(&before.state(), &after.state())
                        .len();
                }
            }
            if lifecycle_seen != expected_lifecycle {
                fail(format!(
                    "{lifecycle_seen} lifecycle events, graph implies {expected_lifecycle}"
                ));
            }

            for contact in &diff.removed {
                report.destroyed += 1;
                let scoped = Topic::scoped(ContactEvent::Refresh, contact.contact_id.clone());
                if bus.subscriber_count(&scoped) != 0 {
                    fail(format!("scoped subscriptions of {} survived", contact.contact_id));
                }
                if let Some(watcher) = watchers.remove(&contact.contact_id) {
                    if watcher.is_active() {
                        fail(format!("watcher of {} still active", contact.contact_id));
                    }
                }
            }

            match engine.current() {
                Ok(current) if *current == next => {}
                _ => fail("engine does not hold the latest snapshot".to_string()),
            }
            report.violations.append(&mut violations);

            previous = Some(next);
        }
        report
    }
}
