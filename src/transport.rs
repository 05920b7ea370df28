//! Bidirectional relay for [`Envelope`]s.
//!
//! Sends are best-effort and at-most-once: a closed channel drops the envelope
//! instead of queueing it. Inbound envelopes go to a single registered handler.

mod envelope;
pub mod frame;
mod peer;
mod socket;

pub use envelope::*;
pub use peer::*;
pub use socket::*;

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::TransportError;
use crate::session::{Role, RoomId};

pub type ReceiveHandler = Box<dyn Fn(Envelope) + Send + Sync>;

#[allow(async_fn_in_trait)]
pub trait RelayTransport {
    fn is_open(&self) -> bool;

    /// Non-blocking send. Fails with [`TransportError::Unavailable`] when the
    /// channel is not open; nothing is queued for later.
    fn try_send(&self, envelope: &Envelope) -> Result<(), TransportError>;

    /// Like [`try_send`](Self::try_send), but a failure is logged and the
    /// envelope dropped.
    fn send(&self, envelope: &Envelope) {
        if let Err(err) = self.try_send(envelope) {
            warn!("dropping outgoing {} envelope: {err}", envelope.kind());
        }
    }

    /// Installs the inbound handler, replacing any previous one.
    fn on_receive(&self, handler: ReceiveHandler);

    /// Announces this participant in `room`.
    async fn join(&self, room: &RoomId, role: Role) -> Result<(), TransportError>;

    /// Closes the channel. No handler call happens after this returns.
    async fn close(&self);
}

/// Holder for the single active receive handler.
#[derive(Clone, Default)]
pub struct HandlerSlot {
    handler: Arc<Mutex<Option<ReceiveHandler>>>,
}

impl HandlerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, handler: ReceiveHandler) {
        match self.handler.lock() {
            Ok(mut slot) => *slot = Some(handler),
            Err(poisoned) => *poisoned.into_inner() = Some(handler),
        }
    }

    pub fn clear(&self) {
        match self.handler.lock() {
            Ok(mut slot) => *slot = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    pub fn dispatch(&self, envelope: Envelope) {
        let Ok(slot) = self.handler.lock() else {
            warn!("receive handler lock poisoned, dropping {} envelope", envelope.kind());
            return;
        };

        match slot.as_ref() {
            Some(handler) => handler(envelope),
            None => debug!("no receive handler, dropping {} envelope", envelope.kind()),
        }
    }

    /// Parses raw JSON and dispatches it; malformed input is logged and dropped.
    pub fn dispatch_bytes(&self, bytes: &[u8]) {
        match Envelope::from_slice(bytes) {
            Ok(envelope) => self.dispatch(envelope),
            Err(err) => warn!("dropping malformed inbound envelope: {err}"),
        }
    }
}

impl std::fmt::Debug for HandlerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let installed = self.handler.lock().map(|h| h.is_some()).unwrap_or(false);
        f.debug_struct("HandlerSlot")
            .field("installed", &installed)
            .finish()
    }
}
