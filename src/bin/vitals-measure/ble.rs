use std::time::Duration;

use btleplug::{
    api::{Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter},
    platform::{Adapter, Manager, Peripheral},
};
use macaddr::MacAddr6;
use tokio::{task::JoinHandle, time::sleep};
use tokio_stream::StreamExt as _;
use tracing::{debug, info, warn};
use vitals_relay::{
    catalog::{DeviceCatalog, DeviceDescriptor},
    device::{DeviceLink, DiscoveredDevice, Notification, NotificationSink},
    error::ConnectionError,
};

const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// [`DeviceLink`] backed by the first local Bluetooth adapter.
pub struct BtleplugLink {
    adapter: Adapter,

    address: Option<MacAddr6>,

    scan_timeout: Duration,

    peripheral: Option<Peripheral>,

    subscribed: Vec<Characteristic>,

    pumps: Vec<JoinHandle<()>>,
}

impl BtleplugLink {
    pub async fn new(
        address: Option<MacAddr6>,
        scan_timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        let manager = Manager::new()
            .await
            .map_err(|e| discovery("failed to initialize Bluetooth manager", e))?;

        let adapter = manager
            .adapters()
            .await
            .map_err(|e| discovery("failed to get Bluetooth adapters", e))?
            .into_iter()
            .next()
            .ok_or_else(|| ConnectionError::Discovery("no Bluetooth adapters found".to_string()))?;

        Ok(Self {
            adapter,
            address,
            scan_timeout,
            peripheral: None,
            subscribed: Vec::new(),
            pumps: Vec::new(),
        })
    }

    async fn find_peripheral(&self, catalog: &DeviceCatalog) -> Result<Peripheral, ConnectionError> {
        let deadline = tokio::time::Instant::now() + self.scan_timeout;

        loop {
            let peripherals = self
                .adapter
                .peripherals()
                .await
                .map_err(|e| discovery("failed to get BLE peripherals", e))?;

            for peripheral in peripherals {
                let mac_address: MacAddr6 = peripheral.address().into_inner().into();
                if self.address.is_some_and(|wanted| wanted != mac_address) {
                    continue;
                }

                let properties = match peripheral.properties().await {
                    Ok(Some(p)) => p,
                    Ok(None) => continue,
                    Err(err) => {
                        debug!("failed to get BLE peripheral properties: {mac_address}: {err}");
                        continue;
                    }
                };

                let advertised = properties
                    .services
                    .iter()
                    .any(|uuid| catalog.resolve_uuid(*uuid).is_some());
                if advertised || self.address.is_some() {
                    info!(
                        "found {} ({mac_address})",
                        properties.local_name.as_deref().unwrap_or("unnamed device")
                    );
                    return Ok(peripheral);
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(ConnectionError::Discovery(format!(
                    "no supported device found within {}s",
                    self.scan_timeout.as_secs()
                )));
            }
            sleep(SCAN_POLL_INTERVAL).await;
        }
    }
}

impl DeviceLink for BtleplugLink {
    async fn discover(
        &mut self,
        catalog: &DeviceCatalog,
    ) -> Result<DiscoveredDevice, ConnectionError> {
        let filter = ScanFilter {
            services: catalog.service_uuids().collect(),
        };
        self.adapter
            .start_scan(filter)
            .await
            .map_err(|e| discovery("failed to start BLE scan", e))?;

        let found = self.find_peripheral(catalog).await;
        if let Err(err) = self.adapter.stop_scan().await {
            warn!("failed to stop BLE scan: {err}");
        }
        let peripheral = found?;

        peripheral
            .connect()
            .await
            .map_err(|e| pairing("failed to connect", e))?;
        if let Err(err) = peripheral.discover_services().await {
            if let Err(disconnect_err) = peripheral.disconnect().await {
                warn!("failed to disconnect: {disconnect_err}");
            }
            return Err(pairing("failed to discover services", err));
        }

        let name = match peripheral.properties().await {
            Ok(Some(properties)) => properties.local_name,
            _ => None,
        }
        .unwrap_or_else(|| peripheral.address().to_string());
        let services = peripheral.services().iter().map(|s| s.uuid).collect();

        self.peripheral = Some(peripheral);
        Ok(DiscoveredDevice { name, services })
    }

    async fn subscribe(
        &mut self,
        service: &'static DeviceDescriptor,
        sink: NotificationSink,
    ) -> Result<(), ConnectionError> {
        let Some(peripheral) = &self.peripheral else {
            return Err(ConnectionError::Pairing("device is not connected".to_string()));
        };

        let characteristics: Vec<Characteristic> = peripheral
            .characteristics()
            .into_iter()
            .filter(|c| c.service_uuid == service.service)
            .filter(|c| service.characteristic(c.uuid).is_some())
            .filter(|c| c.properties.intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE))
            .collect();
        if characteristics.is_empty() {
            return Err(ConnectionError::NoSupportedService);
        }

        // Open the stream before subscribing so the first value is not lost.
        let mut notifications = peripheral
            .notifications()
            .await
            .map_err(|e| pairing("failed to open notification stream", e))?;

        for characteristic in &characteristics {
            peripheral
                .subscribe(characteristic)
                .await
                .map_err(|e| pairing("failed to subscribe", e))?;
            debug!("subscribed {} on {}", characteristic.uuid, service.label);
            self.subscribed.push(characteristic.clone());
        }

        let service_key = service.service_key();
        self.pumps.push(tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if service.characteristic(notification.uuid).is_none() {
                    continue;
                }
                sink(Notification {
                    service_key: service_key.clone(),
                    characteristic: Some(notification.uuid),
                    value: notification.value,
                });
            }
            debug!("notification stream for {service_key} ended");
        }));

        Ok(())
    }

    async fn unsubscribe_all(&mut self) {
        for pump in self.pumps.drain(..) {
            pump.abort();
            let _ = pump.await;
        }

        let Some(peripheral) = self.peripheral.take() else {
            self.subscribed.clear();
            return;
        };
        for characteristic in self.subscribed.drain(..) {
            if let Err(err) = peripheral.unsubscribe(&characteristic).await {
                debug!("failed to unsubscribe {}: {err}", characteristic.uuid);
            }
        }
        if let Err(err) = peripheral.disconnect().await {
            warn!("failed to disconnect: {err}");
        }
    }
}

fn discovery(context: &str, err: btleplug::Error) -> ConnectionError {
    ConnectionError::Discovery(format!("{context}: {err}"))
}

fn pairing(context: &str, err: btleplug::Error) -> ConnectionError {
    ConnectionError::Pairing(format!("{context}: {err}"))
}
