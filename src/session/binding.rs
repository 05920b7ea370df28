//! Binds one pipeline to a room and role, and tears it down in order.
//!
//! All pipeline mutation happens in [`SessionBinding::dispatch`], called from
//! a single control loop. Device notifications and relay envelopes reach that
//! loop as [`SessionEvent`]s tagged with the session that produced them; a tag
//! that does not match the live session is dropped.

use std::cell::Cell;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::aggregator::{LocalAggregator, RemoteAggregator};
use crate::catalog::DeviceCatalog;
use crate::device::{DetachedLink, DeviceLink, Notification, NotificationSink};
use crate::error::{SessionError, TransportError};
use crate::session::{ConnectingGuard, ConnectionStatus, Role, RoomId, SessionState};
use crate::transport::{Envelope, RelayTransport};

/// Identifies the session an event belongs to. The epoch distinguishes
/// successive sessions in the same room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTag {
    pub room_id: RoomId,

    pub epoch: u64,
}

#[derive(Debug)]
pub enum SessionEvent {
    Device {
        tag: SessionTag,
        notification: Notification,
    },
    Relay {
        tag: SessionTag,
        envelope: Envelope,
    },
}

impl SessionEvent {
    pub fn tag(&self) -> &SessionTag {
        match self {
            SessionEvent::Device { tag, .. } | SessionEvent::Relay { tag, .. } => tag,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Appended { service_key: String },
    Dropped,
}

enum Pipeline<L> {
    Measuring {
        link: L,
        local: LocalAggregator,
    },
    Observing {
        remote: RemoteAggregator,
    },
}

struct Session<T, L> {
    tag: SessionTag,
    transport: Arc<T>,
    relay: Cell<ConnectionStatus>,
    pipeline: Pipeline<L>,
}

impl<T: RelayTransport, L> Session<T, L> {
    fn role(&self) -> Role {
        match self.pipeline {
            Pipeline::Measuring { .. } => Role::Measuring,
            Pipeline::Observing { .. } => Role::Observing,
        }
    }

    /// A joined room whose transport has since closed counts as an error.
    fn relay_status(&self) -> ConnectionStatus {
        match self.relay.get() {
            ConnectionStatus::Connected if !self.transport.is_open() => ConnectionStatus::Error,
            status => status,
        }
    }

    /// The relay status until the room is joined, then the device status
    /// for a measuring session.
    fn status(&self) -> ConnectionStatus {
        let relay = self.relay_status();
        match &self.pipeline {
            Pipeline::Measuring { local, .. } if relay == ConnectionStatus::Connected => {
                local.status()
            }
            _ => relay,
        }
    }
}

pub struct SessionBinding<T, L = DetachedLink> {
    catalog: DeviceCatalog,

    epoch: u64,

    events_tx: mpsc::UnboundedSender<SessionEvent>,

    events_rx: mpsc::UnboundedReceiver<SessionEvent>,

    session: Option<Session<T, L>>,
}

impl<T, L> std::fmt::Debug for SessionBinding<T, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBinding")
            .field("epoch", &self.epoch)
            .field("session", &self.session.as_ref().map(|s| &s.tag))
            .finish_non_exhaustive()
    }
}

impl<T, L> SessionBinding<T, L>
where
    T: RelayTransport + 'static,
    L: DeviceLink,
{
    pub fn new(catalog: DeviceCatalog) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            catalog,
            epoch: 0,
            events_tx,
            events_rx,
            session: None,
        }
    }

    pub fn state(&self) -> Option<SessionState> {
        self.session.as_ref().map(|s| SessionState {
            room_id: s.tag.room_id.clone(),
            role: s.role(),
            status: s.status(),
        })
    }

    pub fn status(&self) -> ConnectionStatus {
        self.session
            .as_ref()
            .map_or(ConnectionStatus::Idle, Session::status)
    }

    pub fn local(&self) -> Option<&LocalAggregator> {
        match &self.session.as_ref()?.pipeline {
            Pipeline::Measuring { local, .. } => Some(local),
            Pipeline::Observing { .. } => None,
        }
    }

    pub fn remote(&self) -> Option<&RemoteAggregator> {
        match &self.session.as_ref()?.pipeline {
            Pipeline::Observing { remote, .. } => Some(remote),
            Pipeline::Measuring { .. } => None,
        }
    }

    pub fn transport(&self) -> Option<&T> {
        self.session.as_ref().map(|s| s.transport.as_ref())
    }

    /// Tears down any current session, then joins `room` as the measuring
    /// side, connects the device and starts forwarding its records.
    pub async fn bind_measuring(
        &mut self,
        room_id: RoomId,
        link: L,
        transport: T,
    ) -> Result<(), SessionError> {
        self.unbind().await;

        let tag = self.next_tag(room_id);
        let transport = Arc::new(transport);
        let mut local = LocalAggregator::new(self.catalog);

        let forward_to = Arc::clone(&transport);
        local.on_forward(move |record| match Envelope::measurement(record) {
            Ok(envelope) => forward_to.send(&envelope),
            Err(err) => warn!("failed to wrap {} record: {err}", record.service_key()),
        });

        let sink = self.device_sink(&tag);
        let session = self.session.insert(Session {
            tag,
            transport,
            relay: Cell::new(ConnectionStatus::Idle),
            pipeline: Pipeline::Measuring { link, local },
        });
        info!("bound to room {} as measuring", session.tag.room_id);

        session.transport.on_receive(relay_handler(&self.events_tx, &session.tag));
        join_relay(session).await?;

        if let Pipeline::Measuring { link, local } = &mut session.pipeline {
            local.connect(link, sink).await?;
        }

        Ok(())
    }

    /// Tears down any current session, then joins `room` as an observer.
    pub async fn bind_observing(&mut self, room_id: RoomId, transport: T) -> Result<(), SessionError> {
        self.unbind().await;

        let tag = self.next_tag(room_id);
        let session = self.session.insert(Session {
            tag,
            transport: Arc::new(transport),
            relay: Cell::new(ConnectionStatus::Idle),
            pipeline: Pipeline::Observing {
                remote: RemoteAggregator::new(),
            },
        });
        info!("bound to room {} as observing", session.tag.room_id);

        session.transport.on_receive(relay_handler(&self.events_tx, &session.tag));
        join_relay(session).await?;

        Ok(())
    }

    /// Re-attempts a failed connection. Only ever called on user request.
    pub async fn retry(&mut self) -> Result<(), SessionError> {
        let sink = match &self.session {
            Some(session) => self.device_sink(&session.tag),
            None => return Err(SessionError::NotBound),
        };
        let Some(session) = self.session.as_mut() else {
            return Err(SessionError::NotBound);
        };

        if session.status() == ConnectionStatus::Connected {
            debug!("retry ignored, session already connected");
            return Ok(());
        }

        if session.relay_status() != ConnectionStatus::Connected {
            join_relay(session).await?;
        }
        if let Pipeline::Measuring { link, local } = &mut session.pipeline {
            local.connect(link, sink).await?;
        }

        Ok(())
    }

    /// Cancels device subscriptions, then closes the transport, each fully
    /// completed before returning. Queued events from the old session are
    /// dropped when dispatched.
    pub async fn unbind(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        if let Pipeline::Measuring { link, local } = &mut session.pipeline {
            local.disconnect(link).await;
        }
        session.transport.close().await;

        info!("left room {}", session.tag.room_id);
    }

    /// Waits for the next event from the device or the relay.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events_rx.recv().await
    }

    /// Applies one event to the live session.
    pub fn dispatch(&mut self, event: SessionEvent) -> Dispatch {
        let Some(session) = self.session.as_mut() else {
            debug!("no session bound, dropping event");
            return Dispatch::Dropped;
        };
        if event.tag() != &session.tag {
            debug!(
                "dropping event from stale session {} #{}",
                event.tag().room_id,
                event.tag().epoch
            );
            return Dispatch::Dropped;
        }

        let appended = match (event, &mut session.pipeline) {
            (SessionEvent::Device { notification, .. }, Pipeline::Measuring { local, .. }) => {
                local.handle_notification(&notification).ok().flatten()
            }
            (SessionEvent::Relay { envelope, .. }, Pipeline::Observing { remote, .. }) => {
                remote.apply(envelope).ok()
            }
            (SessionEvent::Relay { envelope, .. }, Pipeline::Measuring { .. }) => {
                debug!("measuring side ignores inbound {} envelope", envelope.kind());
                None
            }
            (SessionEvent::Device { .. }, Pipeline::Observing { .. }) => {
                debug!("observing side has no device, dropping notification");
                None
            }
        };

        match appended {
            Some(record) => Dispatch::Appended {
                service_key: record.service_key().to_string(),
            },
            None => Dispatch::Dropped,
        }
    }

    /// Dispatches every event already queued without waiting for more.
    /// Returns how many records were appended.
    pub fn pump(&mut self) -> usize {
        let mut appended = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            if matches!(self.dispatch(event), Dispatch::Appended { .. }) {
                appended += 1;
            }
        }
        appended
    }

    fn next_tag(&mut self, room_id: RoomId) -> SessionTag {
        self.epoch += 1;
        SessionTag {
            room_id,
            epoch: self.epoch,
        }
    }

    fn device_sink(&self, tag: &SessionTag) -> NotificationSink {
        let events = self.events_tx.clone();
        let tag = tag.clone();
        Arc::new(move |notification| {
            let _ = events.send(SessionEvent::Device {
                tag: tag.clone(),
                notification,
            });
        })
    }
}

fn relay_handler(
    events: &mpsc::UnboundedSender<SessionEvent>,
    tag: &SessionTag,
) -> crate::transport::ReceiveHandler {
    let events = events.clone();
    let tag = tag.clone();
    Box::new(move |envelope| {
        let _ = events.send(SessionEvent::Relay {
            tag: tag.clone(),
            envelope,
        });
    })
}

async fn join_relay<T, L>(session: &Session<T, L>) -> Result<(), TransportError>
where
    T: RelayTransport,
{
    let guard = ConnectingGuard::begin(&session.relay);
    match session.transport.join(&session.tag.room_id, session.role()).await {
        Ok(()) => {
            guard.settle(ConnectionStatus::Connected);
            Ok(())
        }
        Err(err) => {
            warn!("failed to join room {}: {err}", session.tag.room_id);
            guard.settle(ConnectionStatus::Error);
            Err(err)
        }
    }
}
