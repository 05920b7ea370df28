//! Seam between the pipeline and whatever owns the physical BLE link.

use std::sync::Arc;

use uuid::Uuid;

use crate::catalog::{DeviceCatalog, DeviceDescriptor};
use crate::error::ConnectionError;

/// A raw characteristic value as delivered by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub service_key: String,

    pub characteristic: Option<Uuid>,

    pub value: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    pub name: String,

    pub services: Vec<Uuid>,
}

/// Receives notifications for an active subscription. May be called from any
/// task; implementations forward into the control loop.
pub type NotificationSink = Arc<dyn Fn(Notification) + Send + Sync>;

#[allow(async_fn_in_trait)]
pub trait DeviceLink {
    /// Scans for, connects to and pairs with a device exposing at least one
    /// catalogued service. May suspend for as long as discovery takes.
    async fn discover(&mut self, catalog: &DeviceCatalog)
    -> Result<DiscoveredDevice, ConnectionError>;

    async fn subscribe(
        &mut self,
        service: &'static DeviceDescriptor,
        sink: NotificationSink,
    ) -> Result<(), ConnectionError>;

    /// Cancels every subscription. Once this returns no sink is called again.
    async fn unsubscribe_all(&mut self);
}

/// Link for sessions that never touch a device, such as an observer.
#[derive(Debug, Default)]
pub struct DetachedLink;

impl DeviceLink for DetachedLink {
    async fn discover(
        &mut self,
        _catalog: &DeviceCatalog,
    ) -> Result<DiscoveredDevice, ConnectionError> {
        Err(ConnectionError::Discovery(
            "no device link attached".to_string(),
        ))
    }

    async fn subscribe(
        &mut self,
        _service: &'static DeviceDescriptor,
        _sink: NotificationSink,
    ) -> Result<(), ConnectionError> {
        Err(ConnectionError::NoSupportedService)
    }

    async fn unsubscribe_all(&mut self) {}
}
