//! Upstream Peer Simulator
//!
//! Plays the far end of an in-memory link:
//! - Answers `synchronize` with `acknowledge` (optionally late, or never)
//! - Records everything it receives
//! - Pushes snapshots, log entries and arbitrary envelopes back over the link

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use weft_core::{AgentEvent, ProtocolEvent, Topic, WeftResult};
use weft_runtime::LogEntry;
use weft_state::AgentData;
use weft_transport::{MemoryTransport, Transport};
use weft_wire::Envelope;

/// Peer behaviour
#[derive(Clone, Debug)]
pub struct PeerConfig {
    /// Name of the far endpoint; the near endpoint gets a `-near` suffix
    pub name: String,
    /// Answer keepalive syncs
    pub responsive: bool,
    /// Delay before each acknowledgment is sent
    pub ack_delay: Duration,
}

impl Default for PeerConfig {
    fn default() -> Self {
        PeerConfig {
            name: "upstream".to_string(),
            responsive: true,
            ack_delay: Duration::ZERO,
        }
    }
}

impl PeerConfig {
    /// A peer that never acknowledges
    pub fn silent() -> Self {
        PeerConfig {
            responsive: false,
            ..Default::default()
        }
    }

    /// A peer that acknowledges after `delay`
    pub fn sluggish(delay: Duration) -> Self {
        PeerConfig {
            ack_delay: delay,
            ..Default::default()
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }
}

struct PeerState {
    responsive: AtomicBool,
    ack_delay: Duration,
    syncs: AtomicU64,
    acks: AtomicU64,
    received: Mutex<Vec<Envelope>>,
}

impl PeerState {
    fn receive(self: &Arc<Self>, transport: &Weak<MemoryTransport>, envelope: &Envelope) {
        self.received.lock().push(envelope.clone());
        if !envelope.is(&ProtocolEvent::Synchronize.into()) {
            return;
        }

        self.syncs.fetch_add(1, Ordering::Relaxed);
        if !self.responsive.load(Ordering::Acquire) {
            debug!("Peer muted, sync left unanswered");
            return;
        }

        if self.ack_delay.is_zero() {
            if let Some(transport) = transport.upgrade() {
                self.acknowledge(&transport);
            }
            return;
        }

        let Ok(runtime) = Handle::try_current() else {
            warn!("No runtime to schedule a delayed acknowledgment");
            return;
        };
        let state = Arc::clone(self);
        let transport = transport.clone();
        let delay = self.ack_delay;
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(transport) = transport.upgrade() {
                state.acknowledge(&transport);
            }
        });
    }

    fn acknowledge(&self, transport: &MemoryTransport) {
        let ack = Envelope::signal(&ProtocolEvent::Acknowledge.into());
        match transport.send(ack) {
            Ok(()) => {
                self.acks.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => debug!(error = %e, "Acknowledgment not sent"),
        }
    }
}

/// Scripted far end of a link
///
/// Must be created inside a tokio runtime; the receive pump is spawned on it.
pub struct PeerSimulator {
    transport: Arc<MemoryTransport>,
    state: Arc<PeerState>,
}

impl PeerSimulator {
    /// Create a peer together with the near endpoint a channel should own
    pub fn link(config: PeerConfig) -> (Self, MemoryTransport) {
        let (near, far) = MemoryTransport::pair_named(&format!("{}-near", config.name), &config.name);
        let transport = Arc::new(far);
        let state = Arc::new(PeerState {
            responsive: AtomicBool::new(config.responsive),
            ack_delay: config.ack_delay,
            syncs: AtomicU64::new(0),
            acks: AtomicU64::new(0),
            received: Mutex::new(Vec::new()),
        });

        let weak = Arc::downgrade(&transport);
        let handler_state = Arc::clone(&state);
        transport.on_receive(Arc::new(move |envelope: &Envelope| {
            handler_state.receive(&weak, envelope)
        }));

        (PeerSimulator { transport, state }, near)
    }

    pub fn name(&self) -> &str {
        self.transport.name()
    }

    /// Mute or unmute keepalive answers
    pub fn set_responsive(&self, responsive: bool) {
        self.state.responsive.store(responsive, Ordering::Release);
    }

    pub fn is_responsive(&self) -> bool {
        self.state.responsive.load(Ordering::Acquire)
    }

    /// Number of `synchronize` messages seen
    pub fn syncs(&self) -> u64 {
        self.state.syncs.load(Ordering::Relaxed)
    }

    /// Number of acknowledgments sent
    pub fn acks(&self) -> u64 {
        self.state.acks.load(Ordering::Relaxed)
    }

    /// Everything received so far, in arrival order
    pub fn received(&self) -> Vec<Envelope> {
        self.state.received.lock().clone()
    }

    /// Received envelopes carrying `topic`
    pub fn received_on(&self, topic: impl Into<Topic>) -> Vec<Envelope> {
        let topic = topic.into();
        self.state
            .received
            .lock()
            .iter()
            .filter(|e| e.is(&topic))
            .cloned()
            .collect()
    }

    pub fn received_count(&self, topic: impl Into<Topic>) -> usize {
        self.received_on(topic).len()
    }

    pub fn clear_received(&self) {
        self.state.received.lock().clear();
    }

    pub fn send(&self, envelope: Envelope) -> WeftResult<()> {
        self.transport.send(envelope)
    }

    /// Unsolicited acknowledgment, as sent when a context first connects
    pub fn announce(&self) -> WeftResult<()> {
        self.signal(ProtocolEvent::Acknowledge)
    }

    /// Send a payload-less protocol event
    pub fn signal(&self, event: ProtocolEvent) -> WeftResult<()> {
        self.send(Envelope::signal(&event.into()))
    }

    /// Push an agent snapshot as an `agent::update`
    pub fn push_snapshot(&self, data: &AgentData) -> WeftResult<()> {
        let payload = serde_json::to_value(data)?;
        self.send(Envelope::new(&AgentEvent::Update.into(), payload))
    }

    /// Send a log entry as if logged by this peer
    pub fn log(&self, entry: &LogEntry) -> WeftResult<()> {
        let payload = serde_json::to_value(entry)?;
        self.send(Envelope::new(&ProtocolEvent::Log.into(), payload))
    }

    pub fn close(&self) {
        self.transport.close();
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }
}
