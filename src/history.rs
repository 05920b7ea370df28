//! Append-only per-service measurement histories.
//!
//! Histories are grouped flatly by service key; device identity travels in each
//! record's `device_name`.

use indexmap::IndexMap;

use crate::catalog::canonical_service_key;
use crate::measurement::MeasurementRecord;

#[derive(Debug, Clone, Default)]
pub struct ServiceHistory {
    records: Vec<MeasurementRecord>,
}

impl ServiceHistory {
    fn push(&mut self, record: MeasurementRecord) {
        self.records.push(record);
    }

    pub fn latest(&self) -> Option<&MeasurementRecord> {
        self.records.last()
    }

    pub fn records(&self) -> &[MeasurementRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Histories keyed by service, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    services: IndexMap<String, ServiceHistory>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends to the record's own service history and returns the stored record.
    pub(crate) fn append(&mut self, record: MeasurementRecord) -> &MeasurementRecord {
        let history = self
            .services
            .entry(record.service_key().to_string())
            .or_default();
        history.push(record);

        &history.records[history.records.len() - 1]
    }

    /// Lookups accept the same key forms as [`DeviceCatalog::resolve`](crate::catalog::DeviceCatalog::resolve).
    pub fn latest(&self, service_key: &str) -> Option<&MeasurementRecord> {
        self.service(service_key)?.latest()
    }

    /// Read-only view of every record for `service_key`; empty when unseen.
    pub fn history(&self, service_key: &str) -> &[MeasurementRecord] {
        self.service(service_key)
            .map(ServiceHistory::records)
            .unwrap_or_default()
    }

    pub fn service(&self, service_key: &str) -> Option<&ServiceHistory> {
        self.services
            .get(service_key)
            .or_else(|| self.services.get(&canonical_service_key(service_key)))
    }

    pub fn service_keys(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn total_len(&self) -> usize {
        self.services.values().map(ServiceHistory::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
