use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::error::TransportError;
use crate::session::{Role, RoomId};
use crate::transport::{Envelope, HandlerSlot, ReceiveHandler, RelayTransport};

/// A peer-to-peer data channel owned by the media/signalling collaborator.
/// Inbound text is handed to [`PeerChannelTransport::deliver`].
pub trait DataChannel: Send + Sync {
    fn is_open(&self) -> bool;

    fn send_text(&self, text: String) -> Result<(), TransportError>;

    fn close(&self);
}

/// Relay over a peer data channel; usable only while the channel reports open.
pub struct PeerChannelTransport<C> {
    channel: C,

    inbound: HandlerSlot,
}

impl<C: DataChannel> PeerChannelTransport<C> {
    pub fn new(channel: C) -> Self {
        Self::with_slot(channel, HandlerSlot::new())
    }

    fn with_slot(channel: C, inbound: HandlerSlot) -> Self {
        Self { channel, inbound }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Entry point for text arriving on the data channel.
    pub fn deliver(&self, text: &str) {
        if !self.channel.is_open() {
            debug!("data channel closed, ignoring inbound message");
            return;
        }
        self.inbound.dispatch_bytes(text.as_bytes());
    }
}

impl<C> fmt::Debug for PeerChannelTransport<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerChannelTransport")
            .field("inbound", &self.inbound)
            .finish_non_exhaustive()
    }
}

impl<C: DataChannel> RelayTransport for PeerChannelTransport<C> {
    fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    fn try_send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        if !self.channel.is_open() {
            return Err(TransportError::Unavailable);
        }
        self.channel.send_text(envelope.to_json()?)
    }

    fn on_receive(&self, handler: ReceiveHandler) {
        self.inbound.replace(handler);
    }

    // The data channel is already scoped to the room by signalling.
    async fn join(&self, room: &RoomId, role: Role) -> Result<(), TransportError> {
        if !self.channel.is_open() {
            return Err(TransportError::Unavailable);
        }
        debug!("peer channel ready for {room} as {role}");
        Ok(())
    }

    async fn close(&self) {
        self.inbound.clear();
        self.channel.close();
    }
}

/// In-process data channel; both ends share one open flag.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    open: Arc<AtomicBool>,

    remote: HandlerSlot,
}

impl MemoryChannel {
    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }
}

impl DataChannel for MemoryChannel {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn send_text(&self, text: String) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Unavailable);
        }
        self.remote.dispatch_bytes(text.as_bytes());
        Ok(())
    }

    fn close(&self) {
        self.set_open(false);
    }
}

impl PeerChannelTransport<MemoryChannel> {
    /// Two transports joined by an open in-memory channel.
    pub fn memory_pair() -> (Self, Self) {
        let open = Arc::new(AtomicBool::new(true));
        let left = HandlerSlot::new();
        let right = HandlerSlot::new();

        let left_channel = MemoryChannel {
            open: Arc::clone(&open),
            remote: right.clone(),
        };
        let right_channel = MemoryChannel {
            open,
            remote: left.clone(),
        };

        (
            Self::with_slot(left_channel, left),
            Self::with_slot(right_channel, right),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    fn collect(transport: &PeerChannelTransport<MemoryChannel>) -> Arc<Mutex<Vec<Envelope>>> {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        transport.on_receive(Box::new(move |envelope| {
            sink.lock().unwrap().push(envelope);
        }));
        received
    }

    #[test]
    fn test_send_reaches_other_end() {
        let (a, b) = PeerChannelTransport::memory_pair();
        let received = collect(&b);

        a.try_send(&Envelope::new("measurement", json!({"n": 1})))
            .unwrap();

        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_closed_channel_drops_without_error() {
        let (a, b) = PeerChannelTransport::memory_pair();
        let received = collect(&b);
        a.channel().set_open(false);

        assert!(!a.is_open());
        assert!(matches!(
            a.try_send(&Envelope::new("measurement", json!({}))),
            Err(TransportError::Unavailable)
        ));
        a.send(&Envelope::new("measurement", json!({})));

        assert!(received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_join_requires_open_channel() {
        let (a, _b) = PeerChannelTransport::memory_pair();
        let room = RoomId::new("room-1");

        a.join(&room, Role::Measuring).await.unwrap();
        a.close().await;

        assert!(a.join(&room, Role::Measuring).await.is_err());
    }

    #[tokio::test]
    async fn test_close_stops_delivery() {
        let (a, b) = PeerChannelTransport::memory_pair();
        let received = collect(&a);

        a.close().await;
        a.deliver(r#"{"type":"measurement","payload":{}}"#);
        b.send(&Envelope::new("measurement", json!({})));

        assert!(received.lock().unwrap().is_empty());
    }
}
