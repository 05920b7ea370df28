use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::measurement::FieldValue;

/// One decoded notification. Fields keep catalog declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementRecord {
    service_key: String,

    device_name: String,

    timestamp: DateTime<Utc>,

    fields: IndexMap<String, FieldValue>,
}

impl MeasurementRecord {
    pub fn new(
        service_key: impl Into<String>,
        device_name: impl Into<String>,
        timestamp: DateTime<Utc>,
        fields: IndexMap<String, FieldValue>,
    ) -> Self {
        Self {
            service_key: service_key.into(),
            device_name: device_name.into(),
            timestamp,
            fields,
        }
    }

    pub fn service_key(&self) -> &str {
        &self.service_key
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Local receipt time on the measuring side.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn fields(&self) -> &IndexMap<String, FieldValue> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}
