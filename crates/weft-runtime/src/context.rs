//! Process context
//!
//! `Core` owns everything one context needs: the local bus, the snapshot
//! engine attached to it, and at most one upstream channel. A context plays
//! one of two roles on that channel:
//!
//! - worker: sits between a downstream consumer and the upstream worker,
//!   bridges both directions into the bus and relays them across
//! - frame: embeds an upstream peer, waits for its first acknowledgment and
//!   then supervises it with a keepalive

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use weft_bus::{BusConfig, EventBus, Subscription};
use weft_core::{AgentEvent, ContactEvent, ContactId, ProtocolEvent, Topic, WeftError, WeftResult};
use weft_state::{SnapshotDiffEngine, StandardGraphs};
use weft_transport::Channel;
use weft_wire::{Direction, Envelope};

use crate::config::CoreConfig;
use crate::keepalive::KeepaliveManager;
use crate::logging::{LogEntry, LogForwarder, LogLevel};

/// Role of a context on its upstream channel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Worker,
    Frame,
}

/// Counters for forwarded upstream log traffic
#[derive(Clone, Debug, Default)]
pub struct CoreStats {
    pub logs_forwarded: u64,
    pub logs_ignored: u64,
    pub load_timeouts: u64,
}

#[derive(Default)]
struct StatCounters {
    logs_forwarded: AtomicU64,
    logs_ignored: AtomicU64,
    load_timeouts: AtomicU64,
}

struct Link {
    role: Role,
    channel: Arc<Channel>,
    keepalive: Option<Arc<KeepaliveManager>>,
    load_timer: Option<JoinHandle<()>>,
    subs: Vec<Subscription>,
}

/// One context per process
pub struct Core {
    config: CoreConfig,
    runtime: Handle,
    bus: EventBus,
    graphs: Arc<StandardGraphs>,
    engine: RwLock<Arc<SnapshotDiffEngine>>,
    link: Mutex<Option<Link>>,
    initialized: AtomicBool,
    forwarder: LogForwarder,
    stats: Arc<StatCounters>,
}

impl Core {
    /// Build the bus and snapshot engine; must be called inside a tokio runtime
    pub fn new(config: CoreConfig) -> WeftResult<Arc<Self>> {
        config.validate()?;
        let runtime =
            Handle::try_current().map_err(|_| WeftError::NotInitialized("tokio runtime"))?;
        let bus = EventBus::with_config(BusConfig {
            log_events: config.log_events,
        });
        let graphs = StandardGraphs::shared();
        let engine = SnapshotDiffEngine::attach(bus.clone(), Arc::clone(&graphs));
        let forwarder = LogForwarder::new(config.logger_id.clone());

        info!(logger_id = %config.logger_id, "Core created");
        Ok(Arc::new(Core {
            config,
            runtime,
            bus,
            graphs,
            engine: RwLock::new(engine),
            link: Mutex::new(None),
            initialized: AtomicBool::new(false),
            forwarder,
            stats: Arc::default(),
        }))
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn engine(&self) -> Arc<SnapshotDiffEngine> {
        Arc::clone(&self.engine.read())
    }

    /// True once the upstream peer has acknowledged us
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn role(&self) -> Option<Role> {
        self.link.lock().as_ref().map(|link| link.role)
    }

    pub fn upstream(&self) -> WeftResult<Arc<Channel>> {
        self.link
            .lock()
            .as_ref()
            .map(|link| Arc::clone(&link.channel))
            .ok_or(WeftError::NotInitialized("upstream"))
    }

    pub fn keepalive(&self) -> Option<Arc<KeepaliveManager>> {
        self.link.lock().as_ref().and_then(|link| link.keepalive.clone())
    }

    pub fn stats(&self) -> CoreStats {
        CoreStats {
            logs_forwarded: self.stats.logs_forwarded.load(Ordering::Relaxed),
            logs_ignored: self.stats.logs_ignored.load(Ordering::Relaxed),
            load_timeouts: self.stats.load_timeouts.load(Ordering::Relaxed),
        }
    }

    pub fn local_timestamp(&self) -> WeftResult<u64> {
        self.engine().local_timestamp()
    }

    pub fn skew(&self) -> WeftResult<i64> {
        self.engine().skew()
    }

    /// Attach as the worker side of `channel`
    pub fn connect_worker(self: &Arc<Self>, channel: Arc<Channel>) -> WeftResult<()> {
        let mut link = self.link.lock();
        if let Some(existing) = link.as_ref() {
            warn!(channel = existing.channel.name(), "Core already connected");
            return Err(WeftError::AlreadyConnected(existing.channel.name().to_string()));
        }

        let mut subs = Vec::new();
        let bridge = self.bus.bridge();
        subs.push(channel.on_all_upstream(move |env| bridge(env)));
        let bridge = self.bus.bridge();
        subs.push(channel.on_all_downstream(move |env| bridge(env)));
        subs.push(channel.on_all_upstream(channel.pass_downstream()));
        subs.push(channel.on_all_downstream(channel.pass_upstream()));

        let weak = Arc::downgrade(self);
        subs.push(channel.on_upstream_with(ProtocolEvent::Acknowledge, move |sub, _| {
            sub.unsubscribe();
            if let Some(core) = weak.upgrade() {
                core.mark_initialized();
            }
        }));
        subs.push(self.forward_logs(&channel));

        let relay = channel.pass_upstream();
        subs.push(self.bus.subscribe(ProtocolEvent::Terminate, move |data| {
            relay(&Envelope::new(&ProtocolEvent::Terminate.into(), data.clone()))
        }));

        channel.send_upstream(
            ProtocolEvent::Configure,
            self.config.configure.clone().unwrap_or(Value::Null),
        );

        info!(channel = channel.name(), "Connected as worker");
        *link = Some(Link {
            role: Role::Worker,
            channel,
            keepalive: None,
            load_timer: None,
            subs,
        });
        Ok(())
    }

    /// Attach as the frame side of `channel`
    ///
    /// `ack_timeout` is triggered on the bus if the peer does not acknowledge
    /// within `load_timeout`. The first acknowledgment sends `configure` (when
    /// configured) and starts the keepalive.
    pub fn connect_frame(self: &Arc<Self>, channel: Arc<Channel>) -> WeftResult<()> {
        let mut link = self.link.lock();
        if let Some(existing) = link.as_ref() {
            warn!(channel = existing.channel.name(), "Core already connected");
            return Err(WeftError::AlreadyConnected(existing.channel.name().to_string()));
        }

        let keepalive = Arc::new(KeepaliveManager::new(
            Arc::clone(&channel),
            self.bus.clone(),
            self.config.keepalive.clone(),
        )?);

        let mut subs = Vec::new();
        let bridge = self.bus.bridge();
        subs.push(channel.on_all_upstream(move |env| bridge(env)));

        let weak = Arc::downgrade(self);
        subs.push(channel.on_upstream_with(ProtocolEvent::Acknowledge, move |sub, _| {
            sub.unsubscribe();
            if let Some(core) = weak.upgrade() {
                core.on_first_ack();
            }
        }));
        subs.push(self.forward_logs(&channel));

        let weak: Weak<Self> = Arc::downgrade(self);
        let wait = self.config.load_timeout;
        let load_timer = self.runtime.spawn(async move {
            tokio::time::sleep(wait).await;
            if let Some(core) = weak.upgrade() {
                core.on_load_timeout();
            }
        });

        info!(channel = channel.name(), load_timeout = ?wait, "Connected as frame");
        *link = Some(Link {
            role: Role::Frame,
            channel,
            keepalive: Some(keepalive),
            load_timer: Some(load_timer),
            subs,
        });
        Ok(())
    }

    fn forward_logs(&self, channel: &Channel) -> Subscription {
        let forwarder = self.forwarder.clone();
        let stats = Arc::clone(&self.stats);
        channel.on_upstream(ProtocolEvent::Log, move |payload| {
            let counter = if forwarder.forward_payload(payload) {
                &stats.logs_forwarded
            } else {
                &stats.logs_ignored
            };
            counter.fetch_add(1, Ordering::Relaxed);
        })
    }

    fn mark_initialized(&self) {
        if !self.initialized.swap(true, Ordering::AcqRel) {
            info!("Acknowledged by upstream");
        }
    }

    fn on_first_ack(&self) {
        let (channel, keepalive) = {
            let mut link = self.link.lock();
            let Some(link) = link.as_mut() else {
                return;
            };
            if let Some(timer) = link.load_timer.take() {
                timer.abort();
            }
            (Arc::clone(&link.channel), link.keepalive.clone())
        };

        self.mark_initialized();
        if let Some(configure) = &self.config.configure {
            channel.send_upstream(ProtocolEvent::Configure, configure.clone());
        }
        if let Some(keepalive) = keepalive {
            keepalive.start();
        }
    }

    fn on_load_timeout(&self) {
        {
            let mut link = self.link.lock();
            match link.as_mut() {
                Some(link) if link.load_timer.is_some() => link.load_timer = None,
                _ => return,
            }
        }
        self.stats.load_timeouts.fetch_add(1, Ordering::Relaxed);
        warn!(timeout = ?self.config.load_timeout, "No acknowledgment from upstream");
        self.bus.trigger(&ProtocolEvent::AckTimeout.into(), &Value::Null);
    }

    /// Ask the upstream peer to bring a contact into view
    pub fn view_contact(&self, contact_id: impl Into<ContactId>) -> WeftResult<()> {
        let contact_id = contact_id.into();
        let inner = Envelope::new(
            &ContactEvent::View.into(),
            json!({ "contactId": contact_id }),
        );
        self.upstream()?
            .send(Direction::Upstream, Envelope::broadcast(inner));
        Ok(())
    }

    pub fn on_view_contact<F>(&self, handler: F) -> WeftResult<Subscription>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        Ok(self.upstream()?.on_upstream(ContactEvent::View, handler))
    }

    pub fn on_auth_fail<F>(&self, handler: F) -> WeftResult<Subscription>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        Ok(self.upstream()?.on_upstream(ProtocolEvent::AuthFail, handler))
    }

    pub fn on_access_denied<F>(&self, handler: F) -> WeftResult<Subscription>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        Ok(self.upstream()?.on_upstream(ProtocolEvent::AccessDenied, handler))
    }

    pub fn on_configure<F>(&self, handler: F) -> WeftResult<Subscription>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        Ok(self.upstream()?.on_upstream(ProtocolEvent::Configure, handler))
    }

    /// Local notification that the upstream worker has shut down
    pub fn on_terminated<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.bus.subscribe(ProtocolEvent::Terminated, handler)
    }

    pub fn on_ack_timeout<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.bus.subscribe(ProtocolEvent::AckTimeout, handler)
    }

    /// Send one of our own log entries upstream
    pub fn send_log(&self, level: LogLevel, text: impl Into<String>) -> WeftResult<()> {
        let entry = LogEntry::new(&self.config.logger_id, level, text);
        let payload = serde_json::to_value(&entry)?;
        self.upstream()?.send_upstream(ProtocolEvent::Log, payload);
        Ok(())
    }

    /// Feed a snapshot straight into the engine, as an `agent::update` would
    pub fn update_agent(&self, data: &Value) {
        self.bus.trigger(&Topic::Agent(AgentEvent::Update), data);
    }

    /// Drop the channel and every registration; the context can be reconnected
    pub fn terminate(&self) {
        self.disconnect();
        self.bus.unsubscribe_all();
        let engine = SnapshotDiffEngine::attach(self.bus.clone(), Arc::clone(&self.graphs));
        *self.engine.write() = engine;
        self.initialized.store(false, Ordering::Release);
        info!("Core terminated");
    }

    fn disconnect(&self) {
        let Some(link) = self.link.lock().take() else {
            return;
        };
        link.channel.send_upstream(ProtocolEvent::Close, Value::Null);
        if let Some(timer) = link.load_timer {
            timer.abort();
        }
        if let Some(keepalive) = link.keepalive {
            keepalive.stop();
        }
        for sub in link.subs {
            sub.unsubscribe();
        }
        link.channel.close();
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use weft_transport::{MemoryTransport, Transport};

    use crate::keepalive::KeepalivePhase;

    type Inbox = mpsc::UnboundedReceiver<Envelope>;

    fn inbox(transport: &MemoryTransport) -> Inbox {
        let (tx, rx) = mpsc::unbounded_channel();
        transport.on_receive(Arc::new(move |env: &Envelope| {
            let _ = tx.send(env.clone());
        }));
        rx
    }

    fn drain(rx: &mut Inbox) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Ok(env) = rx.try_recv() {
            out.push(env);
        }
        out
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    fn counter(bus: &EventBus, topic: ProtocolEvent) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        bus.subscribe(topic, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    fn signal(event: ProtocolEvent) -> Envelope {
        Envelope::signal(&event.into())
    }

    /// Frame-side core with the upstream peer held by the test
    fn frame(config: CoreConfig) -> (Arc<Core>, MemoryTransport, Inbox) {
        let (near, far) = MemoryTransport::pair_named("frame", "ccp");
        let core = Core::new(config).unwrap();
        let channel = Arc::new(Channel::upstream_only("frame", Arc::new(near)));
        core.connect_frame(channel).unwrap();
        let rx = inbox(&far);
        (core, far, rx)
    }

    /// Worker-side core; returns (core, upstream peer, downstream peer)
    fn worker(config: CoreConfig) -> (Arc<Core>, MemoryTransport, MemoryTransport) {
        let (up_near, up_far) = MemoryTransport::pair_named("worker-up", "shared-worker");
        let (down_near, down_far) = MemoryTransport::pair_named("worker-down", "consumer");
        let core = Core::new(config).unwrap();
        let channel = Arc::new(Channel::new("worker", Arc::new(up_near), Arc::new(down_near)));
        core.connect_worker(channel).unwrap();
        (core, up_far, down_far)
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_load_timeout_fires_once() {
        let (core, _peer, mut rx) = frame(CoreConfig::default());
        let timeouts = counter(core.bus(), ProtocolEvent::AckTimeout);

        tokio::time::advance(Duration::from_millis(2999)).await;
        settle().await;
        assert_eq!(timeouts.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(timeouts.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(timeouts.load(Ordering::SeqCst), 1);
        assert_eq!(core.stats().load_timeouts, 1);
        assert!(!core.is_initialized());
        // no keepalive syncs before the first acknowledgment
        assert!(drain(&mut rx).is_empty());
        assert_eq!(core.keepalive().unwrap().phase(), KeepalivePhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_first_ack_configures_and_starts_keepalive() {
        let config = CoreConfig {
            configure: Some(json!({"softphone": {"allowFramedSoftphone": true}})),
            ..CoreConfig::default()
        };
        let (core, peer, mut rx) = frame(config);
        let timeouts = counter(core.bus(), ProtocolEvent::AckTimeout);

        peer.send(signal(ProtocolEvent::Acknowledge)).unwrap();
        settle().await;

        assert!(core.is_initialized());
        assert_eq!(core.role(), Some(Role::Frame));
        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 2);
        assert!(sent[0].is(&ProtocolEvent::Configure.into()));
        assert_eq!(sent[0].data["softphone"]["allowFramedSoftphone"], true);
        assert!(sent[1].is(&ProtocolEvent::Synchronize.into()));
        assert_eq!(core.keepalive().unwrap().phase(), KeepalivePhase::AwaitingAck);

        // answer the sync; the load timer must be gone
        peer.send(signal(ProtocolEvent::Acknowledge)).unwrap();
        tokio::time::advance(Duration::from_millis(3500)).await;
        settle().await;
        assert_eq!(timeouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_without_configure_sends_only_sync() {
        let (_core, peer, mut rx) = frame(CoreConfig::default());
        peer.send(signal(ProtocolEvent::Acknowledge)).unwrap();
        settle().await;

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].is(&ProtocolEvent::Synchronize.into()));
    }

    #[tokio::test]
    async fn test_worker_relays_and_bridges() {
        let config = CoreConfig {
            configure: Some(json!({"region": "eu"})),
            ..CoreConfig::default()
        };
        let (core, up, down) = worker(config);
        let mut up_rx = inbox(&up);
        let mut down_rx = inbox(&down);
        let broadcasts = counter(core.bus(), ProtocolEvent::Broadcast);

        settle().await;
        let configure = drain(&mut up_rx);
        assert_eq!(configure.len(), 1);
        assert_eq!(configure[0].data["region"], "eu");

        up.send(signal(ProtocolEvent::Broadcast)).unwrap();
        down.send(Envelope::new(&Topic::custom("app::ping").unwrap(), json!(1)))
            .unwrap();
        settle().await;

        assert_eq!(broadcasts.load(Ordering::SeqCst), 1);
        let relayed_down = drain(&mut down_rx);
        assert_eq!(relayed_down.len(), 1);
        assert!(relayed_down[0].is(&ProtocolEvent::Broadcast.into()));
        let relayed_up = drain(&mut up_rx);
        assert_eq!(relayed_up.len(), 1);
        assert_eq!(relayed_up[0].event, "app::ping");

        assert!(!core.is_initialized());
        up.send(signal(ProtocolEvent::Acknowledge)).unwrap();
        settle().await;
        assert!(core.is_initialized());
        assert_eq!(core.role(), Some(Role::Worker));
    }

    #[tokio::test]
    async fn test_worker_forwards_foreign_logs_only() {
        let config = CoreConfig {
            logger_id: "me".into(),
            ..CoreConfig::default()
        };
        let (core, up, _down) = worker(config);

        let foreign = LogEntry::new("shared-worker", LogLevel::Info, "hello");
        let own = LogEntry::new("me", LogLevel::Info, "echo");
        up.send(Envelope::new(
            &ProtocolEvent::Log.into(),
            serde_json::to_value(&foreign).unwrap(),
        ))
        .unwrap();
        up.send(Envelope::new(
            &ProtocolEvent::Log.into(),
            serde_json::to_value(&own).unwrap(),
        ))
        .unwrap();
        settle().await;

        let stats = core.stats();
        assert_eq!(stats.logs_forwarded, 1);
        assert_eq!(stats.logs_ignored, 1);
    }

    #[tokio::test]
    async fn test_worker_forwards_local_terminate_upstream() {
        let (core, up, _down) = worker(CoreConfig::default());
        let mut up_rx = inbox(&up);
        settle().await;
        drain(&mut up_rx);

        let terminated = Arc::new(AtomicUsize::new(0));
        let t = terminated.clone();
        core.on_terminated(move |_| {
            t.fetch_add(1, Ordering::SeqCst);
        });

        core.bus().trigger(&ProtocolEvent::Terminate.into(), &Value::Null);
        settle().await;
        let sent = drain(&mut up_rx);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].is(&ProtocolEvent::Terminate.into()));

        up.send(signal(ProtocolEvent::Terminated)).unwrap();
        settle().await;
        assert_eq!(terminated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_view_contact_round_trip() {
        let (core, peer, mut rx) = frame(CoreConfig::default());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        core.on_view_contact(move |v| sink.lock().push(v.clone()))
            .unwrap();

        core.view_contact("c-7").unwrap();
        settle().await;
        let sent = drain(&mut rx);
        assert!(sent[0].is(&ProtocolEvent::Broadcast.into()));
        assert_eq!(sent[0].data["event"], "contact::view");
        assert_eq!(sent[0].data["data"]["contactId"], "c-7");

        peer.send(Envelope::new(
            &ContactEvent::View.into(),
            json!({"contactId": "c-7"}),
        ))
        .unwrap();
        settle().await;
        assert_eq!(seen.lock()[0]["contactId"], "c-7");
    }

    #[test]
    fn test_new_requires_runtime() {
        assert!(matches!(
            Core::new(CoreConfig::default()),
            Err(WeftError::NotInitialized("tokio runtime"))
        ));
    }

    #[tokio::test]
    async fn test_upstream_hooks_require_connection() {
        let core = Core::new(CoreConfig::default()).unwrap();
        assert!(matches!(core.upstream(), Err(WeftError::NotInitialized(_))));
        assert!(core.on_auth_fail(|_| {}).is_err());
        assert!(core.view_contact("c-1").is_err());
        assert!(core.send_log(LogLevel::Info, "x").is_err());
        assert!(core.keepalive().is_none());
    }

    #[tokio::test]
    async fn test_connect_twice_is_rejected() {
        let (core, _peer, _rx) = frame(CoreConfig::default());
        let (near, _far) = MemoryTransport::pair();
        let again = Arc::new(Channel::upstream_only("second", Arc::new(near)));
        assert!(matches!(
            core.connect_worker(again),
            Err(WeftError::AlreadyConnected(name)) if name == "frame"
        ));
    }

    #[tokio::test]
    async fn test_agent_updates_reach_engine() {
        let core = Core::new(CoreConfig::default()).unwrap();
        core.update_agent(&json!({
            "snapshot": {
                "state": {"name": "Available", "type": "routable"},
                "contacts": [],
                "localTimestamp": 99,
                "skew": 4
            }
        }));
        assert!(core.engine().is_initialized());
        assert_eq!(core.local_timestamp().unwrap(), 99);
        assert_eq!(core.skew().unwrap(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_resets_context() {
        let (core, peer, mut rx) = frame(CoreConfig::default());
        let timeouts = counter(core.bus(), ProtocolEvent::AckTimeout);
        peer.send(signal(ProtocolEvent::Acknowledge)).unwrap();
        settle().await;
        core.update_agent(&json!({
            "snapshot": {"state": {"name": "Available", "type": "routable"}}
        }));
        assert!(core.engine().is_initialized());
        drain(&mut rx);

        let keepalive = core.keepalive().unwrap();
        core.terminate();
        settle().await;

        assert!(!core.is_initialized());
        assert!(core.upstream().is_err());
        assert!(!core.engine().is_initialized());
        assert_eq!(keepalive.phase(), KeepalivePhase::Stopped);
        assert_eq!(core.bus().subscriber_count(&ProtocolEvent::AckTimeout.into()), 0);
        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].is(&ProtocolEvent::Close.into()));

        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(timeouts.load(Ordering::SeqCst), 0);

        // the fresh engine still listens for updates
        core.update_agent(&json!({
            "snapshot": {"state": {"name": "Busy", "type": "routable"}}
        }));
        assert!(core.engine().is_initialized());
    }
}
