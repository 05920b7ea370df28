use std::cell::Cell;
use std::fmt;

use tracing::{debug, info, warn};

use crate::catalog::{DeviceCatalog, DeviceDescriptor};
use crate::device::{DeviceLink, Notification, NotificationSink};
use crate::error::{ConnectionError, IngestError};
use crate::history::HistoryStore;
use crate::ingest::Ingestor;
use crate::measurement::MeasurementRecord;
use crate::session::{ConnectingGuard, ConnectionStatus};

pub type ForwardFn = Box<dyn FnMut(&MeasurementRecord)>;

const UNKNOWN_DEVICE_NAME: &str = "unknown";

/// Device-side owner of measurement history. Every ingested record is
/// appended first and then handed to the forward callback exactly once.
pub struct LocalAggregator {
    ingestor: Ingestor,

    status: Cell<ConnectionStatus>,

    device_name: Option<String>,

    subscribed: Vec<&'static DeviceDescriptor>,

    history: HistoryStore,

    forward: Option<ForwardFn>,
}

impl fmt::Debug for LocalAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalAggregator")
            .field("status", &self.status.get())
            .field("device_name", &self.device_name)
            .field("subscribed", &self.subscribed.len())
            .field("records", &self.history.total_len())
            .finish_non_exhaustive()
    }
}

impl LocalAggregator {
    pub fn new(catalog: DeviceCatalog) -> Self {
        Self {
            ingestor: Ingestor::new(catalog),
            status: Cell::new(ConnectionStatus::Idle),
            device_name: None,
            subscribed: Vec::new(),
            history: HistoryStore::new(),
            forward: None,
        }
    }

    /// Registers the outbound callback, replacing any previous one.
    pub fn on_forward(&mut self, forward: impl FnMut(&MeasurementRecord) + 'static) {
        self.forward = Some(Box::new(forward));
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.get()
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    /// Discovers the device and subscribes every catalogued service it exposes.
    ///
    /// Status moves idle/error → connecting → connected or error. If the
    /// returned future is dropped before it settles, status falls back to idle.
    pub async fn connect<L: DeviceLink>(
        &mut self,
        link: &mut L,
        sink: NotificationSink,
    ) -> Result<(), ConnectionError> {
        if self.status.get() == ConnectionStatus::Connected {
            debug!("device already connected");
            return Ok(());
        }

        let guard = ConnectingGuard::begin(&self.status);

        let device = match link.discover(self.ingestor.catalog()).await {
            Ok(device) => device,
            Err(err) => {
                warn!("device discovery failed: {err}");
                guard.settle(ConnectionStatus::Error);
                return Err(err);
            }
        };

        self.subscribed.clear();
        for service in &device.services {
            let Some(descriptor) = self.ingestor.catalog().resolve_uuid(*service) else {
                debug!("skipping uncatalogued service {service}");
                continue;
            };

            if let Err(err) = link.subscribe(descriptor, sink.clone()).await {
                warn!("failed to subscribe {}: {err}", descriptor.label);
                link.unsubscribe_all().await;
                self.subscribed.clear();
                guard.settle(ConnectionStatus::Error);
                return Err(err);
            }
            self.subscribed.push(descriptor);
        }

        if self.subscribed.is_empty() {
            warn!("{} exposes no catalogued service", device.name);
            link.unsubscribe_all().await;
            guard.settle(ConnectionStatus::Error);
            return Err(ConnectionError::NoSupportedService);
        }

        info!(
            "connected to {} ({} services)",
            device.name,
            self.subscribed.len()
        );
        self.device_name = Some(device.name);
        guard.settle(ConnectionStatus::Connected);

        Ok(())
    }

    /// Ingests one notification and returns the appended record, or `None`
    /// when no device is connected. A notification that fails to decode is
    /// dropped and logged; history and connection are left untouched.
    pub fn handle_notification(
        &mut self,
        notification: &Notification,
    ) -> Result<Option<&MeasurementRecord>, IngestError> {
        if self.status.get() != ConnectionStatus::Connected {
            debug!(
                "ignoring notification for {} while {}",
                notification.service_key,
                self.status.get()
            );
            return Ok(None);
        }

        let device_name = self.device_name.as_deref().unwrap_or(UNKNOWN_DEVICE_NAME);
        let result = match notification.characteristic {
            Some(characteristic) => self.ingestor.ingest_characteristic(
                &notification.service_key,
                characteristic,
                device_name,
                &notification.value,
            ),
            None => self.ingestor.ingest(
                &notification.service_key,
                device_name,
                &notification.value,
            ),
        };

        let record = match result {
            Ok(record) => record,
            Err(err) => {
                warn!(
                    "dropping notification for {}: {err} ({:02x?})",
                    notification.service_key, notification.value
                );
                return Err(err);
            }
        };

        let stored = self.history.append(record);
        if let Some(forward) = self.forward.as_mut() {
            forward(stored);
        }

        Ok(Some(stored))
    }

    pub fn latest(&self, service_key: &str) -> Option<&MeasurementRecord> {
        self.history.latest(service_key)
    }

    pub fn history(&self, service_key: &str) -> &[MeasurementRecord] {
        self.history.history(service_key)
    }

    pub fn store(&self) -> &HistoryStore {
        &self.history
    }

    /// Unsubscribes every service and returns to idle. History is kept.
    pub async fn disconnect<L: DeviceLink>(&mut self, link: &mut L) {
        link.unsubscribe_all().await;
        self.subscribed.clear();
        self.device_name = None;
        self.status.set(ConnectionStatus::Idle);
        debug!("device disconnected");
    }
}
