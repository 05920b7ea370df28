mod builtin;
mod descriptor;

pub use builtin::*;
pub use descriptor::*;

use uuid::Uuid;

// Ref: Bluetooth Core Specification, Vol 3, Part B, 2.5.1 (Bluetooth Base UUID)
const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5f9b_34fb;

/// Expands a 16-bit assigned number to its 128-bit UUID.
pub const fn ble_uuid(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// Immutable lookup table from service identifier to field layout.
#[derive(Debug, Clone, Copy)]
pub struct DeviceCatalog {
    devices: &'static [DeviceDescriptor],
}

impl Default for DeviceCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl DeviceCatalog {
    pub const fn new(devices: &'static [DeviceDescriptor]) -> Self {
        Self { devices }
    }

    pub const fn builtin() -> Self {
        Self::new(BUILTIN_DEVICES)
    }

    /// Accepts a full UUID string or a 16-bit short form such as `1810` or `0x1810`.
    pub fn resolve(&self, service_key: &str) -> Option<&'static DeviceDescriptor> {
        let uuid = parse_service_key(service_key)?;
        self.resolve_uuid(uuid)
    }

    pub fn resolve_uuid(&self, service: Uuid) -> Option<&'static DeviceDescriptor> {
        self.devices.iter().find(|d| d.service == service)
    }

    /// Finds the service owning a characteristic.
    pub fn resolve_characteristic(
        &self,
        characteristic: Uuid,
    ) -> Option<(&'static DeviceDescriptor, &'static CharacteristicDescriptor)> {
        self.devices
            .iter()
            .find_map(|d| d.characteristic(characteristic).map(|c| (d, c)))
    }

    pub fn service_uuids(&self) -> impl Iterator<Item = Uuid> + use<> {
        self.devices.iter().map(|d| d.service)
    }

    pub fn devices(&self) -> &'static [DeviceDescriptor] {
        self.devices
    }
}

/// The canonical 128-bit form of a full or 16-bit service key. Keys that
/// name no UUID are returned unchanged.
pub fn canonical_service_key(service_key: &str) -> String {
    match parse_service_key(service_key) {
        Some(uuid) => uuid.to_string(),
        None => service_key.to_string(),
    }
}

fn parse_service_key(service_key: &str) -> Option<Uuid> {
    if let Ok(uuid) = Uuid::parse_str(service_key) {
        return Some(uuid);
    }

    let hex = service_key
        .strip_prefix("0x")
        .or_else(|| service_key.strip_prefix("0X"))
        .unwrap_or(service_key);
    if hex.len() != 4 {
        return None;
    }

    u16::from_str_radix(hex, 16).ok().map(ble_uuid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ble_uuid() {
        assert_eq!(
            ble_uuid(BLOOD_PRESSURE_SERVICE).to_string(),
            "00001810-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_canonical_service_key() {
        let canonical = "00001810-0000-1000-8000-00805f9b34fb";
        assert_eq!(canonical_service_key("1810"), canonical);
        assert_eq!(canonical_service_key("0x1810"), canonical);
        assert_eq!(canonical_service_key("00001810-0000-1000-8000-00805F9B34FB"), canonical);
        assert_eq!(canonical_service_key("heart-rate"), "heart-rate");
    }

    #[test]
    fn test_resolve_forms() {
        let catalog = DeviceCatalog::builtin();

        let by_uuid = catalog
            .resolve("00001810-0000-1000-8000-00805f9b34fb")
            .unwrap();
        assert_eq!(by_uuid.label, "Blood Pressure");

        assert_eq!(catalog.resolve("1809").unwrap().label, "Health Thermometer");
        assert_eq!(catalog.resolve("0x1822").unwrap().label, "Pulse Oximeter");

        assert!(catalog.resolve("180d").is_none());
        assert!(catalog.resolve("heart-rate").is_none());
        assert!(catalog.resolve("").is_none());
    }

    #[test]
    fn test_resolve_characteristic() {
        let catalog = DeviceCatalog::builtin();

        let (device, characteristic) = catalog
            .resolve_characteristic(ble_uuid(PLX_CONTINUOUS_MEASUREMENT))
            .unwrap();
        assert_eq!(device.service, ble_uuid(PULSE_OXIMETER_SERVICE));
        assert_eq!(characteristic.fields.len(), 6);

        assert!(catalog.resolve_characteristic(ble_uuid(0x2a37)).is_none());
    }

    #[test]
    fn test_primary_is_first_characteristic() {
        let catalog = DeviceCatalog::builtin();
        let oximeter = catalog.resolve("1822").unwrap();
        assert_eq!(
            oximeter.primary().unwrap().uuid,
            ble_uuid(PLX_SPOT_CHECK_MEASUREMENT)
        );
        assert_eq!(catalog.service_uuids().count(), 3);
    }
}
