use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::session::{Role, RoomId};
use crate::transport::frame::{MAX_FRAME_LEN, read_frame, write_frame};
use crate::transport::{Envelope, HandlerSlot, JOINED, ReceiveHandler, RelayTransport};

pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Relay over a TCP connection to a [`RelayServer`](crate::relay::RelayServer);
/// usable for as long as the connection is up.
#[derive(Debug)]
pub struct SocketRelayTransport {
    open: Arc<AtomicBool>,

    outbound: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,

    inbound: HandlerSlot,

    /// Rooms named by `joined` acknowledgements, in arrival order.
    acks: AsyncMutex<mpsc::UnboundedReceiver<RoomId>>,

    join_timeout: Duration,

    writer: Mutex<Option<JoinHandle<()>>>,

    reader: Mutex<Option<JoinHandle<()>>>,
}

impl SocketRelayTransport {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        if let Ok(peer) = stream.peer_addr() {
            info!("connected to relay {peer}");
        }

        let (mut read_half, mut write_half) = stream.into_split();
        let open = Arc::new(AtomicBool::new(true));
        let inbound = HandlerSlot::new();
        let (ack_tx, acks) = mpsc::unbounded_channel::<RoomId>();
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

        let writer_open = Arc::clone(&open);
        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if let Err(err) = write_frame(&mut write_half, &frame).await {
                    warn!("relay write failed: {err}");
                    break;
                }
            }
            writer_open.store(false, Ordering::SeqCst);
            let _ = write_half.shutdown().await;
            debug!("relay writer stopped");
        });

        let reader_open = Arc::clone(&open);
        let reader_inbound = inbound.clone();
        let reader = tokio::spawn(async move {
            loop {
                match read_frame(&mut read_half).await {
                    Ok(Some(bytes)) => match Envelope::from_slice(&bytes) {
                        Ok(envelope) if envelope.kind() == JOINED => match envelope.into_join() {
                            Ok(ack) => {
                                let _ = ack_tx.send(ack.room_id);
                            }
                            Err(err) => warn!("dropping malformed join acknowledgement: {err}"),
                        },
                        Ok(envelope) => reader_inbound.dispatch(envelope),
                        Err(err) => warn!("dropping malformed relay frame: {err}"),
                    },
                    Ok(None) => {
                        info!("relay closed the connection");
                        break;
                    }
                    Err(err) => {
                        warn!("relay read failed: {err}");
                        break;
                    }
                }
            }
            reader_open.store(false, Ordering::SeqCst);
        });

        Ok(Self {
            open,
            outbound: Mutex::new(Some(tx)),
            inbound,
            acks: AsyncMutex::new(acks),
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            writer: Mutex::new(Some(writer)),
            reader: Mutex::new(Some(reader)),
        })
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    fn take_task(slot: &Mutex<Option<JoinHandle<()>>>) -> Option<JoinHandle<()>> {
        match slot.lock() {
            Ok(mut handle) => handle.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

impl RelayTransport for SocketRelayTransport {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn try_send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Unavailable);
        }

        let bytes = envelope.to_vec()?;
        if bytes.len() > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge(bytes.len()));
        }

        let Ok(outbound) = self.outbound.lock() else {
            return Err(TransportError::Unavailable);
        };
        outbound
            .as_ref()
            .ok_or(TransportError::Unavailable)?
            .send(bytes)
            .map_err(|_| TransportError::Unavailable)
    }

    fn on_receive(&self, handler: ReceiveHandler) {
        self.inbound.replace(handler);
    }

    async fn join(&self, room: &RoomId, role: Role) -> Result<(), TransportError> {
        let mut acks = self.acks.lock().await;
        // Acknowledgements that arrived after an earlier join timed out.
        while acks.try_recv().is_ok() {}

        self.try_send(&Envelope::join(room, role)?)?;

        let acked = async {
            while let Some(acked_room) = acks.recv().await {
                if &acked_room == room {
                    return Ok(());
                }
                debug!("ignoring acknowledgement for room {acked_room}");
            }
            Err(TransportError::Unavailable)
        };
        tokio::time::timeout(self.join_timeout, acked)
            .await
            .map_err(|_| TransportError::JoinTimeout(room.to_string()))??;

        info!("joined room {room} as {role}");
        Ok(())
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.inbound.clear();

        // Dropping the sender lets the writer flush what it already has.
        if let Ok(mut outbound) = self.outbound.lock() {
            outbound.take();
        }
        if let Some(writer) = Self::take_task(&self.writer) {
            let _ = writer.await;
        }

        if let Some(reader) = Self::take_task(&self.reader) {
            reader.abort();
            let _ = reader.await;
        }

        debug!("relay transport closed");
    }
}

impl Drop for SocketRelayTransport {
    fn drop(&mut self) {
        for slot in [&self.writer, &self.reader] {
            if let Some(task) = Self::take_task(slot) {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    use super::*;
    use crate::transport::frame::write_envelope;

    #[tokio::test]
    async fn test_late_ack_does_not_satisfy_next_join() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let relay = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let first = read_frame(&mut stream).await.unwrap().unwrap();
            let first = Envelope::from_slice(&first).unwrap().into_join().unwrap();

            release_rx.await.unwrap();
            write_envelope(&mut stream, &Envelope::joined(&first.room_id).unwrap())
                .await
                .unwrap();

            // The second join is never acknowledged.
            let second = read_frame(&mut stream).await.unwrap().unwrap();
            let second = Envelope::from_slice(&second).unwrap().into_join().unwrap();
            (first.room_id, second.room_id, stream)
        });

        let transport = SocketRelayTransport::connect(addr)
            .await
            .unwrap()
            .with_join_timeout(Duration::from_millis(100));

        let err = transport
            .join(&RoomId::new("ward-7"), Role::Observing)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::JoinTimeout(_)));

        release_tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = transport
            .join(&RoomId::new("ward-8"), Role::Observing)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::JoinTimeout(_)));

        let (first, second, _stream) = relay.await.unwrap();
        assert_eq!(first, RoomId::new("ward-7"));
        assert_eq!(second, RoomId::new("ward-8"));

        transport.close().await;
    }

    #[tokio::test]
    async fn test_ack_for_other_room_is_ignored() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let relay = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_frame(&mut stream).await.unwrap().unwrap();
            write_envelope(&mut stream, &Envelope::joined(&RoomId::new("ward-6")).unwrap())
                .await
                .unwrap();
            stream
        });

        let transport = SocketRelayTransport::connect(addr)
            .await
            .unwrap()
            .with_join_timeout(Duration::from_millis(100));
        let err = transport
            .join(&RoomId::new("ward-7"), Role::Measuring)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::JoinTimeout(_)));

        let _stream = relay.await.unwrap();
        transport.close().await;
    }
}
