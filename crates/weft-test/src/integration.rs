//! End-to-end Integration Suite
//!
//! Wires real `Core` contexts to simulated peers and verifies:
//! - The frame handshake and keepalive against live, muted and flaky peers
//! - Snapshots flowing from upstream into the diff engine
//! - A frame behind a worker relaying to the same upstream peer
//! - Framing over byte streams

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use weft_bus::{EventBus, Subscription};
use weft_core::{Topic, WeftResult};
use weft_runtime::{Core, CoreConfig};
use weft_transport::{Channel, MemoryTransport};

use crate::simulator::{PeerConfig, PeerSimulator};

// ============================================================================
// HELPERS
// ============================================================================

/// Let spawned pumps and timers run
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Advance a paused clock by `total` in 100ms steps, settling after each
///
/// Panics if the tokio clock is not paused.
pub async fn run_for(total: Duration) {
    let step = Duration::from_millis(100);
    let mut elapsed = Duration::ZERO;
    while elapsed < total {
        let next = step.min(total - elapsed);
        tokio::time::advance(next).await;
        settle().await;
        elapsed += next;
    }
}

/// Records every event published on a bus
pub struct EventRecorder {
    seen: Arc<Mutex<Vec<(Topic, Value)>>>,
    subscription: Subscription,
}

impl EventRecorder {
    pub fn attach(bus: &EventBus) -> Self {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = bus.subscribe_all(move |_, topic: &Topic, payload: &Value| {
            sink.lock().push((topic.clone(), payload.clone()))
        });
        EventRecorder { seen, subscription }
    }

    /// Topic names in publication order
    pub fn topics(&self) -> Vec<String> {
        self.seen.lock().iter().map(|(t, _)| t.to_string()).collect()
    }

    pub fn payloads(&self, topic: impl Into<Topic>) -> Vec<Value> {
        let topic = topic.into();
        self.seen
            .lock()
            .iter()
            .filter(|(t, _)| *t == topic)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn count(&self, topic: impl Into<Topic>) -> usize {
        self.payloads(topic).len()
    }

    pub fn clear(&self) {
        self.seen.lock().clear();
    }

    pub fn detach(&self) {
        self.subscription.unsubscribe();
    }
}

// ============================================================================
// HARNESSES
// ============================================================================

/// A frame-side core linked to a simulated upstream peer
pub struct FrameHarness {
    pub core: Arc<Core>,
    pub peer: PeerSimulator,
}

impl FrameHarness {
    /// Must be called inside a tokio runtime
    pub fn connect(config: CoreConfig, peer: PeerConfig) -> WeftResult<Self> {
        let (peer, near) = PeerSimulator::link(peer);
        let core = Core::new(config)?;
        core.connect_frame(Arc::new(Channel::upstream_only("frame", Arc::new(near))))?;
        Ok(FrameHarness { core, peer })
    }

    /// Connect and let the peer acknowledge the new context
    pub async fn handshake(config: CoreConfig, peer: PeerConfig) -> WeftResult<Self> {
        let harness = Self::connect(config, peer)?;
        harness.peer.announce()?;
        settle().await;
        Ok(harness)
    }
}

/// A worker between a simulated upstream peer and a frame-side core
pub struct RelayHarness {
    pub worker: Arc<Core>,
    pub frame: Arc<Core>,
    pub peer: PeerSimulator,
}

impl RelayHarness {
    /// Must be called inside a tokio runtime
    pub fn connect(
        worker_config: CoreConfig,
        frame_config: CoreConfig,
        peer: PeerConfig,
    ) -> WeftResult<Self> {
        let (peer, upstream) = PeerSimulator::link(peer);
        let (worker_down, frame_up) = MemoryTransport::pair_named("worker-down", "frame-up");

        let worker = Core::new(worker_config)?;
        worker.connect_worker(Arc::new(Channel::new(
            "worker",
            Arc::new(upstream),
            Arc::new(worker_down),
        )))?;

        let frame = Core::new(frame_config)?;
        frame.connect_frame(Arc::new(Channel::upstream_only("frame", Arc::new(frame_up))))?;

        Ok(RelayHarness {
            worker,
            frame,
            peer,
        })
    }
}
