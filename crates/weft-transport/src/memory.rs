//! In-process transport
//!
//! Two linked endpoints over unbounded tokio channels. Envelopes sent before
//! the peer registers a handler are buffered and delivered once it does.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use weft_core::{WeftError, WeftResult};
use weft_wire::{Envelope, EnvelopeHandler};

use crate::transport::{Handlers, Transport};

/// Envelope receiver channel
pub type EnvelopeReceiver = mpsc::UnboundedReceiver<Envelope>;

/// Envelope sender channel
pub type EnvelopeSender = mpsc::UnboundedSender<Envelope>;

/// One endpoint of an in-memory link
pub struct MemoryTransport {
    name: String,
    tx: Mutex<Option<EnvelopeSender>>,
    rx: Mutex<Option<EnvelopeReceiver>>,
    handlers: Handlers,
    pump: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl MemoryTransport {
    /// Create two linked endpoints
    pub fn pair() -> (Self, Self) {
        Self::pair_named("a", "b")
    }

    pub fn pair_named(a: &str, b: &str) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (Self::endpoint(a, a_tx, a_rx), Self::endpoint(b, b_tx, b_rx))
    }

    fn endpoint(name: &str, tx: EnvelopeSender, rx: EnvelopeReceiver) -> Self {
        MemoryTransport {
            name: name.to_string(),
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            handlers: Handlers::default(),
            pump: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn ensure_pump(&self) {
        let mut pump = self.pump.lock();
        if pump.is_some() {
            return;
        }
        let Some(rx) = self.rx.lock().take() else {
            return;
        };
        match Handle::try_current() {
            Ok(runtime) => {
                *pump = Some(start_pump(
                    &runtime,
                    self.name.clone(),
                    rx,
                    self.handlers.clone(),
                ));
            }
            Err(_) => {
                warn!(transport = %self.name, "No tokio runtime; delivery deferred");
                *self.rx.lock() = Some(rx);
            }
        }
    }
}

/// Deliver everything arriving on `rx` to `handlers`, in order
fn start_pump(
    runtime: &Handle,
    name: String,
    mut rx: EnvelopeReceiver,
    handlers: Handlers,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        while let Some(envelope) = rx.recv().await {
            handlers.dispatch(&name, &envelope);
        }
        debug!(transport = %name, "Peer endpoint gone");
    })
}

impl Transport for MemoryTransport {
    fn send(&self, envelope: Envelope) -> WeftResult<()> {
        if self.is_closed() {
            return Err(WeftError::TransportClosed);
        }
        match self.tx.lock().as_ref() {
            Some(tx) => tx.send(envelope).map_err(|_| WeftError::TransportClosed),
            None => Err(WeftError::TransportClosed),
        }
    }

    fn on_receive(&self, handler: EnvelopeHandler) {
        if self.is_closed() {
            return;
        }
        self.handlers.push(handler);
        self.ensure_pump();
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.tx.lock().take();
        self.rx.lock().take();
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        self.handlers.clear();
        debug!(transport = %self.name, "Memory transport closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.close();
    }
}
