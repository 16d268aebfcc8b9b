//! Transport capability

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use weft_core::{WeftError, WeftResult};
use weft_wire::{Envelope, EnvelopeHandler};

/// One half of a duplex link to another context
///
/// Envelopes passed to `send` reach the peer in order. Envelopes arriving
/// from the peer are delivered, in arrival order, to every handler
/// registered through `on_receive`.
pub trait Transport: Send + Sync {
    fn send(&self, envelope: Envelope) -> WeftResult<()>;

    fn on_receive(&self, handler: EnvelopeHandler);

    /// Stop sending and receiving; idempotent
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Transport that accepts and discards everything
#[derive(Debug, Default)]
pub struct NullTransport {
    closed: AtomicBool,
}

impl NullTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for NullTransport {
    fn send(&self, _envelope: Envelope) -> WeftResult<()> {
        if self.is_closed() {
            return Err(WeftError::TransportClosed);
        }
        Ok(())
    }

    fn on_receive(&self, _handler: EnvelopeHandler) {}

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Receive-side handler list shared with a pump task
#[derive(Clone, Default)]
pub(crate) struct Handlers {
    inner: Arc<Mutex<Vec<EnvelopeHandler>>>,
}

impl Handlers {
    pub(crate) fn push(&self, handler: EnvelopeHandler) {
        self.inner.lock().push(handler);
    }

    pub(crate) fn clear(&self) {
        self.inner.lock().clear();
    }

    pub(crate) fn dispatch(&self, transport: &str, envelope: &Envelope) {
        let handlers = self.inner.lock().clone();
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(envelope))).is_err() {
                error!(transport, event = %envelope.event, "Receive handler panicked");
            }
        }
    }
}
