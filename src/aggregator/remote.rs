use tracing::{debug, warn};

use crate::error::EnvelopeError;
use crate::history::HistoryStore;
use crate::measurement::MeasurementRecord;
use crate::transport::Envelope;

/// Observer-side replica of the measuring side's histories, fed one
/// envelope at a time. Each delivered record is appended exactly once.
#[derive(Debug, Default)]
pub struct RemoteAggregator {
    history: HistoryStore,

    rejected: u64,
}

impl RemoteAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the envelope's record. Anything that is not a well-formed
    /// measurement is logged and dropped without touching history.
    pub fn apply(&mut self, envelope: Envelope) -> Result<&MeasurementRecord, EnvelopeError> {
        let kind = envelope.kind().to_string();
        let record = match envelope.into_measurement() {
            Ok(record) => record,
            Err(err) => {
                self.rejected += 1;
                warn!("rejecting {kind} envelope: {err}");
                return Err(err);
            }
        };

        debug!(
            "replicated {} reading from {}",
            record.service_key(),
            record.device_name()
        );
        Ok(self.history.append(record))
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

    /// Envelopes dropped by [`apply`](Self::apply).
    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use indexmap::IndexMap;
    use serde_json::json;

    use super::*;
    use crate::measurement::{FieldValue, Ieee11073Float};

    fn reading(service_key: &str, spo2: f64) -> MeasurementRecord {
        let mut fields = IndexMap::new();
        fields.insert(
            "spo2".to_string(),
            FieldValue::Float(Ieee11073Float::Number(spo2)),
        );
        MeasurementRecord::new(service_key, "Nonin 3230", Utc::now(), fields)
    }

    #[test]
    fn test_apply_appends_in_delivery_order() {
        let mut remote = RemoteAggregator::new();

        for spo2 in [97.0, 96.0, 98.0] {
            let envelope = Envelope::measurement(&reading("1822", spo2)).unwrap();
            remote.apply(envelope).unwrap();
        }

        let history = remote.history("1822");
        assert_eq!(history.len(), 3);
        assert_eq!(remote.latest("1822"), history.last());
        assert_eq!(
            remote.latest("1822").unwrap().field("spo2").unwrap().as_number(),
            Some(98.0)
        );
    }

    #[test]
    fn test_rejects_other_kinds() {
        let mut remote = RemoteAggregator::new();

        let err = remote
            .apply(Envelope::new("presence", json!({"online": true})))
            .unwrap_err();

        assert!(matches!(err, EnvelopeError::UnexpectedKind { .. }));
        assert!(remote.store().is_empty());
        assert_eq!(remote.rejected(), 1);
    }

    #[test]
    fn test_rejects_malformed_measurement() {
        let mut remote = RemoteAggregator::new();

        let err = remote
            .apply(Envelope::new("measurement", json!({"serviceKey": "1822"})))
            .unwrap_err();

        assert!(matches!(err, EnvelopeError::Json(_)));
        assert!(remote.store().is_empty());
    }
}
