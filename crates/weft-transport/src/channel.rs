//! Directional channel
//!
//! A channel owns the transport towards its upstream peer and the transport
//! towards its downstream peer. Each direction has its own registry; an
//! envelope that arrives from upstream is never seen by downstream
//! subscribers and vice versa.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use weft_bus::{BusConfig, EventBus, Subscription};
use weft_core::Topic;
use weft_wire::{Direction, Envelope};

use crate::transport::{NullTransport, Transport};

/// Channel configuration
#[derive(Clone, Debug, Default)]
pub struct ChannelConfig {
    /// Log every envelope sent or received
    pub log_events: bool,
}

/// Duplex link with independent upstream and downstream halves
pub struct Channel {
    name: String,
    config: ChannelConfig,
    upstream: Arc<dyn Transport>,
    downstream: Arc<dyn Transport>,
    upstream_bus: EventBus,
    downstream_bus: EventBus,
    closed: AtomicBool,
}

impl Channel {
    pub fn new(name: &str, upstream: Arc<dyn Transport>, downstream: Arc<dyn Transport>) -> Self {
        Self::with_config(name, upstream, downstream, ChannelConfig::default())
    }

    /// Channel with no downstream peer
    pub fn upstream_only(name: &str, upstream: Arc<dyn Transport>) -> Self {
        Self::new(name, upstream, Arc::new(NullTransport::new()))
    }

    pub fn with_config(
        name: &str,
        upstream: Arc<dyn Transport>,
        downstream: Arc<dyn Transport>,
        config: ChannelConfig,
    ) -> Self {
        let bus_config = BusConfig {
            log_events: config.log_events,
        };
        let upstream_bus = EventBus::with_config(bus_config.clone());
        let downstream_bus = EventBus::with_config(bus_config);

        upstream.on_receive(upstream_bus.bridge());
        downstream.on_receive(downstream_bus.bridge());

        debug!(channel = name, "Channel opened");
        Channel {
            name: name.to_string(),
            config,
            upstream,
            downstream,
            upstream_bus,
            downstream_bus,
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn transport(&self, direction: Direction) -> &Arc<dyn Transport> {
        match direction {
            Direction::Upstream => &self.upstream,
            Direction::Downstream => &self.downstream,
        }
    }

    fn registry(&self, direction: Direction) -> &EventBus {
        match direction {
            Direction::Upstream => &self.upstream_bus,
            Direction::Downstream => &self.downstream_bus,
        }
    }

    /// Write an envelope to one direction
    ///
    /// Fire-and-forget: failures are logged and the envelope is dropped.
    pub fn send(&self, direction: Direction, envelope: Envelope) {
        if self.is_closed() {
            warn!(channel = %self.name, %direction, event = %envelope.event, "Send on closed channel");
            return;
        }
        if self.config.log_events {
            debug!(channel = %self.name, %direction, event = %envelope.event, "Sending");
        }
        let event = envelope.event.clone();
        if let Err(e) = self.transport(direction).send(envelope) {
            warn!(channel = %self.name, %direction, %event, error = %e, "Send failed");
        }
    }

    pub fn send_upstream(&self, topic: impl Into<Topic>, data: Value) {
        self.send(Direction::Upstream, Envelope::new(&topic.into(), data));
    }

    pub fn send_downstream(&self, topic: impl Into<Topic>, data: Value) {
        self.send(Direction::Downstream, Envelope::new(&topic.into(), data));
    }

    /// Subscribe to one topic arriving from `direction`
    pub fn on<F>(&self, direction: Direction, topic: impl Into<Topic>, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.registry(direction).subscribe(topic, handler)
    }

    /// Like `on`, with the handler receiving its own subscription
    pub fn on_with<F>(
        &self,
        direction: Direction,
        topic: impl Into<Topic>,
        handler: F,
    ) -> Subscription
    where
        F: Fn(&Subscription, &Value) + Send + Sync + 'static,
    {
        self.registry(direction).subscribe_with(topic, handler)
    }

    /// Every envelope arriving from `direction`, in arrival order
    pub fn on_all<F>(&self, direction: Direction, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.registry(direction)
            .subscribe_all(move |_, topic, data| handler(&Envelope::new(topic, data.clone())))
    }

    pub fn on_upstream<F>(&self, topic: impl Into<Topic>, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.on(Direction::Upstream, topic, handler)
    }

    pub fn on_downstream<F>(&self, topic: impl Into<Topic>, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.on(Direction::Downstream, topic, handler)
    }

    pub fn on_upstream_with<F>(&self, topic: impl Into<Topic>, handler: F) -> Subscription
    where
        F: Fn(&Subscription, &Value) + Send + Sync + 'static,
    {
        self.on_with(Direction::Upstream, topic, handler)
    }

    pub fn on_downstream_with<F>(&self, topic: impl Into<Topic>, handler: F) -> Subscription
    where
        F: Fn(&Subscription, &Value) + Send + Sync + 'static,
    {
        self.on_with(Direction::Downstream, topic, handler)
    }

    pub fn on_all_upstream<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.on_all(Direction::Upstream, handler)
    }

    pub fn on_all_downstream<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.on_all(Direction::Downstream, handler)
    }

    /// Handler that re-sends each envelope it receives towards `direction`
    pub fn pass(&self, direction: Direction) -> impl Fn(&Envelope) + Send + Sync + 'static {
        let transport = Arc::clone(self.transport(direction));
        let name = self.name.clone();
        move |envelope: &Envelope| {
            if let Err(e) = transport.send(envelope.clone()) {
                warn!(channel = %name, %direction, event = %envelope.event, error = %e, "Relay failed");
            }
        }
    }

    pub fn pass_upstream(&self) -> impl Fn(&Envelope) + Send + Sync + 'static {
        self.pass(Direction::Upstream)
    }

    pub fn pass_downstream(&self) -> impl Fn(&Envelope) + Send + Sync + 'static {
        self.pass(Direction::Downstream)
    }

    /// Close both transports and drop every registration
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.upstream.close();
        self.downstream.close();
        self.upstream_bus.unsubscribe_all();
        self.downstream_bus.unsubscribe_all();
        info!(channel = %self.name, "Channel closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryTransport;
    use serde_json::json;
    use tokio::sync::mpsc;
    use weft_core::{ContactEvent, ProtocolEvent};
    use weft_wire::EnvelopeHandler;

    fn collector() -> (EnvelopeHandler, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: EnvelopeHandler = Arc::new(move |env: &Envelope| {
            let _ = tx.send(env.clone());
        });
        (handler, rx)
    }

    /// A channel in the middle, with test-held peer endpoints on both sides
    fn middle() -> (Channel, MemoryTransport, MemoryTransport) {
        let (up_near, up_far) = MemoryTransport::pair_named("up-near", "up-far");
        let (down_near, down_far) = MemoryTransport::pair_named("down-near", "down-far");
        let channel = Channel::new("middle", Arc::new(up_near), Arc::new(down_near));
        (channel, up_far, down_far)
    }

    #[tokio::test]
    async fn test_send_reaches_named_direction_only() {
        let (channel, up_far, down_far) = middle();
        let (up_handler, mut up_rx) = collector();
        let (down_handler, mut down_rx) = collector();
        up_far.on_receive(up_handler);
        down_far.on_receive(down_handler);

        channel.send_upstream(ProtocolEvent::Synchronize, Value::Null);
        channel.send_downstream(ContactEvent::View, json!({"contactId": "c-1"}));

        assert!(up_rx.recv().await.unwrap().is(&ProtocolEvent::Synchronize.into()));
        let down = down_rx.recv().await.unwrap();
        assert!(down.is(&ContactEvent::View.into()));
        assert_eq!(down.data["contactId"], "c-1");
        assert!(up_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_directions_never_cross() {
        let (channel, up_far, down_far) = middle();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let up_tx = tx.clone();
        channel.on_upstream(ProtocolEvent::Acknowledge, move |_| {
            let _ = up_tx.send("upstream");
        });
        let down_tx = tx.clone();
        channel.on_downstream(ProtocolEvent::Acknowledge, move |_| {
            let _ = down_tx.send("downstream");
        });

        down_far
            .send(Envelope::signal(&ProtocolEvent::Acknowledge.into()))
            .unwrap();
        assert_eq!(rx.recv().await, Some("downstream"));
        up_far
            .send(Envelope::signal(&ProtocolEvent::Acknowledge.into()))
            .unwrap();
        assert_eq!(rx.recv().await, Some("upstream"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_pass_through_preserves_order_and_payload() {
        let (channel, up_far, down_far) = middle();
        let (handler, mut rx) = collector();
        up_far.on_receive(handler);
        channel.on_all_downstream(channel.pass_upstream());

        for i in 0..10 {
            down_far
                .send(Envelope::new(&Topic::custom("app::tick").unwrap(), json!(i)))
                .unwrap();
        }
        for i in 0..10 {
            let env = rx.recv().await.unwrap();
            assert_eq!(env.event, "app::tick");
            assert_eq!(env.data, json!(i));
        }
    }

    #[tokio::test]
    async fn test_one_shot_upstream_handler() {
        let (channel, up_far, _down_far) = middle();
        let (tx, mut rx) = mpsc::unbounded_channel();
        channel.on_upstream_with(ProtocolEvent::Acknowledge, move |sub, data| {
            sub.unsubscribe();
            let _ = tx.send(data.clone());
        });

        for i in 0..3 {
            up_far
                .send(Envelope::new(&ProtocolEvent::Acknowledge.into(), json!(i)))
                .unwrap();
        }
        assert_eq!(rx.recv().await, Some(json!(0)));
        // handler dropped its sender when it was unsubscribed
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_close_drops_sends() {
        let (channel, up_far, _down_far) = middle();
        let (handler, mut rx) = collector();
        up_far.on_receive(handler);

        channel.close();
        assert!(channel.is_closed());
        channel.send_upstream(ProtocolEvent::Log, Value::Null);
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_upstream_only_channel() {
        let (near, far) = MemoryTransport::pair();
        let channel = Channel::upstream_only("frame", Arc::new(near));
        let (handler, mut rx) = collector();
        far.on_receive(handler);

        channel.send_downstream(ProtocolEvent::Log, Value::Null);
        channel.send_upstream(ProtocolEvent::Configure, json!({"softphone": true}));
        let env = rx.recv().await.unwrap();
        assert!(env.is(&ProtocolEvent::Configure.into()));
    }
}
