use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EnvelopeError;
use crate::measurement::MeasurementRecord;
use crate::session::{Role, RoomId};

pub const MEASUREMENT: &str = "measurement";
pub const JOIN: &str = "join";
pub const JOINED: &str = "joined";

/// Wire unit: `{"type": ..., "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    kind: String,

    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    pub room_id: RoomId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    pub fn measurement(record: &MeasurementRecord) -> Result<Self, EnvelopeError> {
        Ok(Self::new(MEASUREMENT, serde_json::to_value(record)?))
    }

    pub fn join(room_id: &RoomId, role: Role) -> Result<Self, EnvelopeError> {
        let payload = JoinPayload {
            room_id: room_id.clone(),
            role: Some(role),
        };
        Ok(Self::new(JOIN, serde_json::to_value(payload)?))
    }

    pub fn joined(room_id: &RoomId) -> Result<Self, EnvelopeError> {
        let payload = JoinPayload {
            room_id: room_id.clone(),
            role: None,
        };
        Ok(Self::new(JOINED, serde_json::to_value(payload)?))
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn is_control(&self) -> bool {
        self.kind == JOIN || self.kind == JOINED
    }

    pub fn into_measurement(self) -> Result<MeasurementRecord, EnvelopeError> {
        self.expect_kind(MEASUREMENT)?;
        Ok(serde_json::from_value(self.payload)?)
    }

    pub fn into_join(self) -> Result<JoinPayload, EnvelopeError> {
        if self.kind != JOIN && self.kind != JOINED {
            return Err(EnvelopeError::UnexpectedKind {
                expected: JOIN,
                actual: self.kind,
            });
        }
        Ok(serde_json::from_value(self.payload)?)
    }

    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn expect_kind(&self, expected: &'static str) -> Result<(), EnvelopeError> {
        if self.kind != expected {
            return Err(EnvelopeError::UnexpectedKind {
                expected,
                actual: self.kind.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use indexmap::IndexMap;

    use super::*;
    use crate::measurement::{DeviceDateTime, FieldValue, Ieee11073Float, SpecialValue};

    fn record() -> MeasurementRecord {
        let mut fields = IndexMap::new();
        fields.insert(
            "temperature".to_string(),
            FieldValue::Float(Ieee11073Float::Number(36.6)),
        );
        fields.insert(
            "probe".to_string(),
            FieldValue::Float(Ieee11073Float::Special(SpecialValue::NRes)),
        );
        fields.insert(
            "timestamp".to_string(),
            FieldValue::DateTime(DeviceDateTime {
                year: 2024,
                month: 11,
                day: 2,
                hours: 14,
                minutes: 3,
                seconds: 59,
            }),
        );
        MeasurementRecord::new(
            "00001809-0000-1000-8000-00805f9b34fb",
            "Thermo",
            Utc.timestamp_opt(1_730_556_239, 123_456_789).unwrap(),
            fields,
        )
    }

    #[test]
    fn test_wire_shape() {
        let json = Envelope::measurement(&record()).unwrap().to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["type"], "measurement");
        assert_eq!(
            value["payload"]["serviceKey"],
            "00001809-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(value["payload"]["deviceName"], "Thermo");
        assert_eq!(value["payload"]["fields"]["temperature"], 36.6);
        assert_eq!(value["payload"]["fields"]["probe"], "NRes");
        assert!(value["payload"]["timestamp"].is_string());
    }

    #[test]
    fn test_measurement_survives_the_wire() {
        let original = record();

        let bytes = Envelope::measurement(&original).unwrap().to_vec().unwrap();
        let decoded = Envelope::from_slice(&bytes)
            .unwrap()
            .into_measurement()
            .unwrap();

        assert_eq!(decoded, original);
        let names: Vec<&String> = decoded.fields().keys().collect();
        assert_eq!(names, ["temperature", "probe", "timestamp"]);
    }

    #[test]
    fn test_other_kind_is_not_a_measurement() {
        let envelope = Envelope::from_json(r#"{"type":"chat","payload":{"text":"hi"}}"#).unwrap();

        let err = envelope.into_measurement().unwrap_err();
        assert!(matches!(err, EnvelopeError::UnexpectedKind { actual, .. } if actual == "chat"));
    }

    #[test]
    fn test_join_round_trip() {
        let room = RoomId::new("ward-7");
        let envelope = Envelope::join(&room, Role::Observing).unwrap();
        assert!(envelope.is_control());

        let payload = Envelope::from_json(&envelope.to_json().unwrap())
            .unwrap()
            .into_join()
            .unwrap();
        assert_eq!(payload.room_id, room);
        assert_eq!(payload.role, Some(Role::Observing));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(Envelope::from_json("not json").is_err());
        assert!(Envelope::from_json(r#"{"payload":{}}"#).is_err());
    }
}
