//! Keepalive supervision
//!
//! Periodically sends `synchronize` to the upstream peer and expects an
//! `acknowledge` within `ack_timeout`. A missing acknowledgment is announced
//! once on the bus as `ack_timeout`; in either case the next sync is
//! scheduled `syn_timeout` later.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use weft_bus::{EventBus, Subscription};
use weft_core::{ProtocolEvent, WeftError, WeftResult};
use weft_transport::Channel;

use crate::config::duration_str;

/// Keepalive timing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepaliveConfig {
    /// Delay between a finished cycle and the next sync
    #[serde(with = "duration_str")]
    pub syn_timeout: Duration,
    /// How long to wait for an acknowledgment
    #[serde(with = "duration_str")]
    pub ack_timeout: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        KeepaliveConfig {
            syn_timeout: Duration::from_secs(1),
            ack_timeout: Duration::from_secs(3),
        }
    }
}

impl KeepaliveConfig {
    pub fn validate(&self) -> WeftResult<()> {
        if self.syn_timeout.is_zero() || self.ack_timeout.is_zero() {
            return Err(WeftError::InvalidConfig(
                "keepalive timeouts must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Where the manager is in its sync cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeepalivePhase {
    Idle,
    AwaitingAck,
    Acked,
    TimedOut,
    ScheduledRestart,
    Stopped,
}

impl fmt::Display for KeepalivePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeepalivePhase::Idle => "idle",
            KeepalivePhase::AwaitingAck => "awaiting_ack",
            KeepalivePhase::Acked => "acked",
            KeepalivePhase::TimedOut => "timed_out",
            KeepalivePhase::ScheduledRestart => "scheduled_restart",
            KeepalivePhase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

struct KeepaliveState {
    phase: KeepalivePhase,
    /// Incremented by every `start`; callbacks from older cycles are ignored
    cycle: u64,
    ack_sub: Option<Subscription>,
    ack_timer: Option<JoinHandle<()>>,
    syn_timer: Option<JoinHandle<()>>,
    timeouts: u64,
}

struct KeepaliveInner {
    channel: Arc<Channel>,
    bus: EventBus,
    config: KeepaliveConfig,
    runtime: Handle,
    state: Mutex<KeepaliveState>,
}

/// Synchronize/acknowledge liveness supervisor for a channel's upstream peer
pub struct KeepaliveManager {
    inner: Arc<KeepaliveInner>,
}

impl KeepaliveManager {
    /// Must be called inside a tokio runtime
    pub fn new(
        channel: Arc<Channel>,
        bus: EventBus,
        config: KeepaliveConfig,
    ) -> WeftResult<Self> {
        config.validate()?;
        let runtime =
            Handle::try_current().map_err(|_| WeftError::NotInitialized("tokio runtime"))?;
        Ok(KeepaliveManager {
            inner: Arc::new(KeepaliveInner {
                channel,
                bus,
                config,
                runtime,
                state: Mutex::new(KeepaliveState {
                    phase: KeepalivePhase::Idle,
                    cycle: 0,
                    ack_sub: None,
                    ack_timer: None,
                    syn_timer: None,
                    timeouts: 0,
                }),
            }),
        })
    }

    /// Send a sync and arm the acknowledgment timer
    pub fn start(&self) {
        self.inner.start();
    }

    /// Cancel every timer and the pending acknowledgment handler
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn phase(&self) -> KeepalivePhase {
        self.inner.state.lock().phase
    }

    pub fn config(&self) -> &KeepaliveConfig {
        &self.inner.config
    }

    /// Number of `ack_timeout` events announced so far
    pub fn timeouts(&self) -> u64 {
        self.inner.state.lock().timeouts
    }

    pub fn has_ack_timer(&self) -> bool {
        self.inner.state.lock().ack_timer.is_some()
    }

    pub fn has_restart_timer(&self) -> bool {
        self.inner.state.lock().syn_timer.is_some()
    }
}

impl Drop for KeepaliveManager {
    fn drop(&mut self) {
        self.inner.stop();
    }
}

impl KeepaliveInner {
    fn start(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if state.phase == KeepalivePhase::Stopped {
                return;
            }
            if let Some(timer) = state.ack_timer.take() {
                timer.abort();
            }
            if let Some(sub) = state.ack_sub.take() {
                sub.unsubscribe();
            }

            state.cycle += 1;
            let cycle = state.cycle;
            state.phase = KeepalivePhase::AwaitingAck;

            let weak = Arc::downgrade(self);
            state.ack_sub = Some(self.channel.on_upstream_with(
                ProtocolEvent::Acknowledge,
                move |sub, _| {
                    sub.unsubscribe();
                    if let Some(inner) = weak.upgrade() {
                        inner.on_ack(cycle);
                    }
                },
            ));

            let weak = Arc::downgrade(self);
            let wait = self.config.ack_timeout;
            state.ack_timer = Some(self.runtime.spawn(async move {
                tokio::time::sleep(wait).await;
                if let Some(inner) = weak.upgrade() {
                    inner.on_ack_timeout(cycle);
                }
            }));
            debug!(channel = self.channel.name(), cycle, "Keepalive sync");
        }
        self.channel.send_upstream(ProtocolEvent::Synchronize, Value::Null);
    }

    fn on_ack(self: &Arc<Self>, cycle: u64) {
        {
            let mut state = self.state.lock();
            if state.cycle != cycle || state.phase != KeepalivePhase::AwaitingAck {
                return;
            }
            if let Some(timer) = state.ack_timer.take() {
                timer.abort();
            }
            state.ack_sub = None;
            state.phase = KeepalivePhase::Acked;
        }
        debug!(channel = self.channel.name(), cycle, "Keepalive acknowledged");
        self.defer_start();
    }

    fn on_ack_timeout(self: &Arc<Self>, cycle: u64) {
        {
            let mut state = self.state.lock();
            if state.cycle != cycle || state.phase != KeepalivePhase::AwaitingAck {
                return;
            }
            // this runs on the timer task itself; dropping the handle detaches it
            state.ack_timer = None;
            if let Some(sub) = state.ack_sub.take() {
                sub.unsubscribe();
            }
            state.phase = KeepalivePhase::TimedOut;
            state.timeouts += 1;
        }
        warn!(
            channel = self.channel.name(),
            cycle,
            timeout = ?self.config.ack_timeout,
            "Keepalive acknowledgment timed out"
        );
        self.bus.trigger(&ProtocolEvent::AckTimeout.into(), &Value::Null);
        self.defer_start();
    }

    /// Schedule the next `start` unless one is already pending
    fn defer_start(self: &Arc<Self>) {
        let mut state = self.state.lock();
        if state.phase == KeepalivePhase::Stopped || state.syn_timer.is_some() {
            return;
        }
        state.phase = KeepalivePhase::ScheduledRestart;

        let weak: Weak<Self> = Arc::downgrade(self);
        let wait = self.config.syn_timeout;
        state.syn_timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(wait).await;
            if let Some(inner) = weak.upgrade() {
                inner.state.lock().syn_timer = None;
                inner.start();
            }
        }));
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        if state.phase == KeepalivePhase::Stopped {
            return;
        }
        state.phase = KeepalivePhase::Stopped;
        if let Some(timer) = state.ack_timer.take() {
            timer.abort();
        }
        if let Some(timer) = state.syn_timer.take() {
            timer.abort();
        }
        if let Some(sub) = state.ack_sub.take() {
            sub.unsubscribe();
        }
        info!(channel = self.channel.name(), "Keepalive stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;
    use weft_transport::{MemoryTransport, Transport};
    use weft_wire::Envelope;

    struct Fixture {
        channel: Arc<Channel>,
        peer: Arc<MemoryTransport>,
        syncs: mpsc::UnboundedReceiver<Envelope>,
        bus: EventBus,
        timeouts: Arc<AtomicUsize>,
    }

    /// Channel whose upstream peer is held by the test; `answer` makes the
    /// peer acknowledge every sync
    fn fixture(answer: bool) -> Fixture {
        let (near, far) = MemoryTransport::pair_named("frame", "ccp");
        let channel = Arc::new(Channel::upstream_only("frame", Arc::new(near)));
        let peer = Arc::new(far);

        let (tx, syncs) = mpsc::unbounded_channel();
        let weak_peer = Arc::downgrade(&peer);
        peer.on_receive(Arc::new(move |env: &Envelope| {
            let _ = tx.send(env.clone());
            if answer && env.is(&ProtocolEvent::Synchronize.into()) {
                if let Some(peer) = weak_peer.upgrade() {
                    let _ = peer.send(Envelope::signal(&ProtocolEvent::Acknowledge.into()));
                }
            }
        }));

        let bus = EventBus::new();
        let timeouts = Arc::new(AtomicUsize::new(0));
        let count = timeouts.clone();
        bus.subscribe(ProtocolEvent::AckTimeout, move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });

        Fixture {
            channel,
            peer,
            syncs,
            bus,
            timeouts,
        }
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Envelope>) -> usize {
        let mut n = 0;
        while rx.try_recv().is_ok() {
            n += 1;
        }
        n
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_times_out_once_per_cycle() {
        let mut f = fixture(false);
        let ka = KeepaliveManager::new(f.channel.clone(), f.bus.clone(), KeepaliveConfig::default())
            .unwrap();
        ka.start();
        settle().await;
        assert_eq!(drain(&mut f.syncs), 1);
        assert_eq!(ka.phase(), KeepalivePhase::AwaitingAck);
        assert!(ka.has_ack_timer());

        tokio::time::advance(Duration::from_millis(2999)).await;
        settle().await;
        assert_eq!(f.timeouts.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(f.timeouts.load(Ordering::SeqCst), 1);
        assert_eq!(ka.phase(), KeepalivePhase::ScheduledRestart);
        assert!(!ka.has_ack_timer());
        assert!(ka.has_restart_timer());

        // restart no sooner than syn_timeout after the timeout
        tokio::time::advance(Duration::from_millis(999)).await;
        settle().await;
        assert_eq!(drain(&mut f.syncs), 0);

        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(drain(&mut f.syncs), 1);
        assert_eq!(ka.phase(), KeepalivePhase::AwaitingAck);
        assert!(!ka.has_restart_timer());
        assert_eq!(f.timeouts.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(3)).await;
        settle().await;
        assert_eq!(f.timeouts.load(Ordering::SeqCst), 2);
        assert_eq!(ka.timeouts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_answering_peer_never_times_out() {
        let mut f = fixture(true);
        let ka = KeepaliveManager::new(f.channel.clone(), f.bus.clone(), KeepaliveConfig::default())
            .unwrap();
        ka.start();

        for _ in 0..10 {
            settle().await;
            tokio::time::advance(Duration::from_millis(500)).await;
        }
        settle().await;

        assert_eq!(f.timeouts.load(Ordering::SeqCst), 0);
        // one sync per elapsed second, plus the first
        let syncs = drain(&mut f.syncs);
        assert!((5..=6).contains(&syncs), "{} syncs", syncs);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_everything() {
        let mut f = fixture(false);
        let ka = KeepaliveManager::new(f.channel.clone(), f.bus.clone(), KeepaliveConfig::default())
            .unwrap();
        ka.start();
        settle().await;
        ka.stop();
        assert_eq!(ka.phase(), KeepalivePhase::Stopped);
        assert!(!ka.has_ack_timer());

        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(f.timeouts.load(Ordering::SeqCst), 0);
        assert_eq!(drain(&mut f.syncs), 1);

        ka.start();
        settle().await;
        assert_eq!(drain(&mut f.syncs), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_ack_after_timeout_is_ignored() {
        let mut f = fixture(false);
        let config = KeepaliveConfig {
            syn_timeout: Duration::from_secs(5),
            ack_timeout: Duration::from_secs(1),
        };
        let ka = KeepaliveManager::new(f.channel.clone(), f.bus.clone(), config).unwrap();
        ka.start();
        settle().await;
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(ka.phase(), KeepalivePhase::ScheduledRestart);

        f.peer
            .send(Envelope::signal(&ProtocolEvent::Acknowledge.into()))
            .unwrap();
        settle().await;
        assert_eq!(ka.phase(), KeepalivePhase::ScheduledRestart);
        assert!(ka.has_restart_timer());
        assert_eq!(drain(&mut f.syncs), 1);
        assert_eq!(f.timeouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejects_zero_timeouts() {
        let f = fixture(false);
        let config = KeepaliveConfig {
            syn_timeout: Duration::ZERO,
            ..KeepaliveConfig::default()
        };
        assert!(matches!(
            KeepaliveManager::new(f.channel.clone(), f.bus.clone(), config),
            Err(WeftError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_requires_runtime() {
        let (near, _far) = MemoryTransport::pair();
        let channel = Arc::new(Channel::upstream_only("frame", Arc::new(near)));
        assert!(matches!(
            KeepaliveManager::new(channel, EventBus::new(), KeepaliveConfig::default()),
            Err(WeftError::NotInitialized("tokio runtime"))
        ));
    }
}
