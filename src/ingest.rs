//! Turns one raw GATT notification into a [`MeasurementRecord`].

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use uuid::Uuid;

use crate::catalog::{CharacteristicDescriptor, DeviceCatalog, FieldKind, FieldOffset};
use crate::decoder;
use crate::error::IngestError;
use crate::measurement::{FieldValue, MeasurementRecord};

/// Size of the leading flags byte every catalogued characteristic starts with.
const FLAGS_LEN: usize = 1;

#[derive(Debug, Clone, Copy, Default)]
pub struct Ingestor {
    catalog: DeviceCatalog,
}

impl Ingestor {
    pub fn new(catalog: DeviceCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &DeviceCatalog {
        &self.catalog
    }

    /// Decodes `raw` with the service's measurement characteristic.
    pub fn ingest(
        &self,
        service_key: &str,
        device_name: &str,
        raw: &[u8],
    ) -> Result<MeasurementRecord, IngestError> {
        self.ingest_at(service_key, None, device_name, raw, Utc::now())
    }

    pub fn ingest_characteristic(
        &self,
        service_key: &str,
        characteristic: Uuid,
        device_name: &str,
        raw: &[u8],
    ) -> Result<MeasurementRecord, IngestError> {
        self.ingest_at(service_key, Some(characteristic), device_name, raw, Utc::now())
    }

    pub fn ingest_at(
        &self,
        service_key: &str,
        characteristic: Option<Uuid>,
        device_name: &str,
        raw: &[u8],
        received_at: DateTime<Utc>,
    ) -> Result<MeasurementRecord, IngestError> {
        let device = self
            .catalog
            .resolve(service_key)
            .ok_or_else(|| IngestError::UnknownService {
                service_key: service_key.to_string(),
            })?;

        let descriptor = match characteristic {
            Some(uuid) => device.characteristic(uuid),
            None => device.primary(),
        }
        .ok_or_else(|| IngestError::UnknownCharacteristic {
            service_key: device.service_key(),
            characteristic: characteristic.unwrap_or_default(),
        })?;

        let fields = decode_fields(descriptor, raw)?;

        Ok(MeasurementRecord::new(
            device.service_key(),
            device_name,
            received_at,
            fields,
        ))
    }
}

fn decode_fields(
    descriptor: &CharacteristicDescriptor,
    raw: &[u8],
) -> Result<IndexMap<String, FieldValue>, IngestError> {
    let Some(&flags) = raw.first() else {
        return Err(IngestError::MalformedPayload {
            field: "flags",
            offset: 0,
            len: 0,
        });
    };

    let mut fields = IndexMap::with_capacity(descriptor.fields.len());
    let mut cursor = FLAGS_LEN;

    for spec in descriptor.fields {
        let offset = match spec.kind {
            FieldKind::Fixed { offset } => offset,
            FieldKind::Conditional { mask, .. } if flags & mask == 0 => continue,
            FieldKind::Conditional {
                offset: FieldOffset::At(offset),
                ..
            } => offset,
            FieldKind::Conditional {
                offset: FieldOffset::AfterPrevious,
                ..
            } => cursor,
        };

        if offset >= raw.len() {
            return Err(IngestError::MalformedPayload {
                field: spec.name,
                offset,
                len: raw.len(),
            });
        }

        let kind = spec.decoder_or(descriptor.decoder);
        let value = decoder::decode(kind, raw, offset).map_err(|source| IngestError::Decode {
            field: spec.name,
            source,
        })?;

        cursor = offset + kind.width();
        fields.insert(spec.name.to_string(), value);
    }

    Ok(fields)
}
