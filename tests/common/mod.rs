#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use vitals_relay::{
    catalog::{BLOOD_PRESSURE_SERVICE, DeviceCatalog, DeviceDescriptor, ble_uuid},
    device::{DeviceLink, DiscoveredDevice, Notification, NotificationSink},
    error::ConnectionError,
};

/// Device link whose sink stays reachable from the test, even after
/// unsubscribing, so late deliveries can be simulated.
#[derive(Clone, Default)]
pub struct FakeLink {
    sink: Arc<Mutex<Option<NotificationSink>>>,
}

impl FakeLink {
    pub fn notify(&self, value: Vec<u8>) {
        let sink = self.sink.lock().unwrap().clone().unwrap();
        sink(Notification {
            service_key: "1810".to_string(),
            characteristic: None,
            value,
        });
    }
}

impl DeviceLink for FakeLink {
    async fn discover(
        &mut self,
        _catalog: &DeviceCatalog,
    ) -> Result<DiscoveredDevice, ConnectionError> {
        Ok(DiscoveredDevice {
            name: "A&D UA-651".to_string(),
            services: vec![ble_uuid(BLOOD_PRESSURE_SERVICE)],
        })
    }

    async fn subscribe(
        &mut self,
        _service: &'static DeviceDescriptor,
        sink: NotificationSink,
    ) -> Result<(), ConnectionError> {
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    async fn unsubscribe_all(&mut self) {}
}

pub fn cuff(systolic: u8, diastolic: u8) -> Vec<u8> {
    vec![0x00, systolic, 0x00, diastolic, 0x00, 0x5a, 0x00]
}

pub fn bp_key() -> String {
    ble_uuid(BLOOD_PRESSURE_SERVICE).to_string()
}
