//! TCP rendezvous point for [`SocketRelayTransport`](crate::transport::SocketRelayTransport)
//! clients.
//!
//! Clients announce themselves with a `join` envelope and get a `joined`
//! acknowledgement. Every other frame is forwarded verbatim to the other
//! members of the sender's room, in the order the sender wrote them.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::session::RoomId;
use crate::transport::Envelope;
use crate::transport::frame::{read_frame, write_frame};

type Outbox = mpsc::UnboundedSender<Vec<u8>>;

#[derive(Debug)]
struct Member {
    id: u64,

    outbox: Outbox,
}

#[derive(Debug, Default)]
struct Rooms {
    members: HashMap<RoomId, Vec<Member>>,
}

impl Rooms {
    fn join(&mut self, room_id: RoomId, id: u64, outbox: Outbox) {
        self.leave(id);
        self.members
            .entry(room_id)
            .or_default()
            .push(Member { id, outbox });
    }

    fn leave(&mut self, id: u64) {
        for members in self.members.values_mut() {
            members.retain(|m| m.id != id);
        }
        self.members.retain(|_, members| !members.is_empty());
    }

    fn forward(&self, room_id: &RoomId, from: u64, frame: &[u8]) -> usize {
        let Some(members) = self.members.get(room_id) else {
            return 0;
        };

        members
            .iter()
            .filter(|m| m.id != from)
            .filter(|m| m.outbox.send(frame.to_vec()).is_ok())
            .count()
    }
}

#[derive(Debug)]
pub struct RelayServer {
    listener: TcpListener,

    rooms: Arc<Mutex<Rooms>>,
}

impl RelayServer {
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            rooms: Arc::new(Mutex::new(Rooms::default())),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts clients until the listener fails. Each client is served on
    /// its own task.
    pub async fn run(self) -> Result<(), TransportError> {
        info!("relay listening on {}", self.local_addr()?);

        let mut next_id = 0u64;
        loop {
            let (stream, peer) = self.listener.accept().await?;
            next_id += 1;
            info!("client #{next_id} connected from {peer}");

            let rooms = Arc::clone(&self.rooms);
            let id = next_id;
            tokio::spawn(async move {
                if let Err(err) = serve_client(stream, id, &rooms).await {
                    warn!("client #{id} failed: {err}");
                }
                lock(&rooms).leave(id);
                info!("client #{id} disconnected");
            });
        }
    }
}

async fn serve_client(stream: TcpStream, id: u64, rooms: &Mutex<Rooms>) -> Result<(), TransportError> {
    stream.set_nodelay(true)?;
    let (mut read_half, mut write_half) = stream.into_split();
    let (outbox, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(err) = write_frame(&mut write_half, &frame).await {
                debug!("client #{id} write failed: {err}");
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    let mut room: Option<RoomId> = None;
    let result = loop {
        let frame = match read_frame(&mut read_half).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break Ok(()),
            Err(err) => break Err(err),
        };

        let envelope = match Envelope::from_slice(&frame) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!("client #{id} sent a malformed frame: {err}");
                continue;
            }
        };

        if envelope.is_control() {
            let join = match envelope.into_join() {
                Ok(join) => join,
                Err(err) => {
                    warn!("client #{id} sent a bad join: {err}");
                    continue;
                }
            };
            let ack = Envelope::joined(&join.room_id)?.to_vec()?;

            lock(rooms).join(join.room_id.clone(), id, outbox.clone());
            let _ = outbox.send(ack);
            match join.role {
                Some(role) => info!("client #{id} joined room {} as {role}", join.room_id),
                None => info!("client #{id} joined room {}", join.room_id),
            }
            room = Some(join.room_id);
            continue;
        }

        let Some(room_id) = &room else {
            debug!("client #{id} sent {} before joining, dropping", envelope.kind());
            continue;
        };
        let delivered = lock(rooms).forward(room_id, id, &frame);
        debug!(
            "forwarded {} from client #{id} to {delivered} peers in {room_id}",
            envelope.kind()
        );
    };

    lock(rooms).leave(id);
    drop(outbox);
    let _ = writer.await;

    result
}

fn lock(rooms: &Mutex<Rooms>) -> std::sync::MutexGuard<'_, Rooms> {
    match rooms.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
