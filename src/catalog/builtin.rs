use crate::catalog::{
    CharacteristicDescriptor, DeviceDescriptor, FieldOffset, FieldSpec, ble_uuid,
};
use crate::decoder::DecoderKind;

// Ref: Bluetooth SIG Assigned Numbers, GATT services and characteristics.
pub const BLOOD_PRESSURE_SERVICE: u16 = 0x1810;
pub const BLOOD_PRESSURE_MEASUREMENT: u16 = 0x2a35;
pub const HEALTH_THERMOMETER_SERVICE: u16 = 0x1809;
pub const TEMPERATURE_MEASUREMENT: u16 = 0x2a1c;
pub const PULSE_OXIMETER_SERVICE: u16 = 0x1822;
pub const PLX_SPOT_CHECK_MEASUREMENT: u16 = 0x2a5e;
pub const PLX_CONTINUOUS_MEASUREMENT: u16 = 0x2a5f;

pub static BUILTIN_DEVICES: &[DeviceDescriptor] = &[
    DeviceDescriptor {
        service: ble_uuid(BLOOD_PRESSURE_SERVICE),
        label: "Blood Pressure",
        characteristics: &[CharacteristicDescriptor {
            uuid: ble_uuid(BLOOD_PRESSURE_MEASUREMENT),
            decoder: DecoderKind::Sfloat16,
            fields: &[
                FieldSpec::fixed("systolic", 1),
                FieldSpec::fixed("diastolic", 3),
                FieldSpec::fixed("meanArterialPressure", 5),
                FieldSpec::conditional("timestamp", 0x02, FieldOffset::At(7))
                    .with_decoder(DecoderKind::DateTime),
                FieldSpec::conditional("pulseRate", 0x04, FieldOffset::AfterPrevious),
            ],
        }],
    },
    DeviceDescriptor {
        service: ble_uuid(HEALTH_THERMOMETER_SERVICE),
        label: "Health Thermometer",
        characteristics: &[CharacteristicDescriptor {
            uuid: ble_uuid(TEMPERATURE_MEASUREMENT),
            decoder: DecoderKind::Ieee11073Float32,
            fields: &[
                FieldSpec::fixed("temperature", 1),
                FieldSpec::conditional("timestamp", 0x02, FieldOffset::At(5))
                    .with_decoder(DecoderKind::DateTime),
            ],
        }],
    },
    DeviceDescriptor {
        service: ble_uuid(PULSE_OXIMETER_SERVICE),
        label: "Pulse Oximeter",
        characteristics: &[
            CharacteristicDescriptor {
                uuid: ble_uuid(PLX_SPOT_CHECK_MEASUREMENT),
                decoder: DecoderKind::Sfloat16,
                fields: &[
                    FieldSpec::fixed("spo2", 1),
                    FieldSpec::fixed("pulseRate", 3),
                    FieldSpec::conditional("timestamp", 0x01, FieldOffset::At(5))
                        .with_decoder(DecoderKind::DateTime),
                ],
            },
            CharacteristicDescriptor {
                uuid: ble_uuid(PLX_CONTINUOUS_MEASUREMENT),
                decoder: DecoderKind::Sfloat16,
                fields: &[
                    FieldSpec::fixed("spo2", 1),
                    FieldSpec::fixed("pulseRate", 3),
                    FieldSpec::conditional("spo2Fast", 0x01, FieldOffset::AfterPrevious),
                    FieldSpec::conditional("pulseRateFast", 0x01, FieldOffset::AfterPrevious),
                    FieldSpec::conditional("spo2Slow", 0x02, FieldOffset::AfterPrevious),
                    FieldSpec::conditional("pulseRateSlow", 0x02, FieldOffset::AfterPrevious),
                ],
            },
        ],
    },
];
