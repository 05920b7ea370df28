use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Reserved IEEE-11073 bit patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecialValue {
    #[serde(rename = "NaN")]
    NaN,
    /// Not at this resolution.
    #[serde(rename = "NRes")]
    NRes,
    #[serde(rename = "+INFINITY")]
    PositiveInfinity,
    #[serde(rename = "-INFINITY")]
    NegativeInfinity,
    /// Reserved for future use.
    #[serde(rename = "RFU")]
    Reserved,
}

impl SpecialValue {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpecialValue::NaN => "NaN",
            SpecialValue::NRes => "NRes",
            SpecialValue::PositiveInfinity => "+INFINITY",
            SpecialValue::NegativeInfinity => "-INFINITY",
            SpecialValue::Reserved => "RFU",
        }
    }
}

/// A decoded SFLOAT16 or FLOAT32 value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Ieee11073Float {
    Number(f64),
    Special(SpecialValue),
}

impl Ieee11073Float {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Ieee11073Float::Number(v) => Some(*v),
            Ieee11073Float::Special(_) => None,
        }
    }

    /// Lossy conversion where sentinels become `NaN` or an infinity.
    pub fn to_f64(&self) -> f64 {
        match self {
            Ieee11073Float::Number(v) => *v,
            Ieee11073Float::Special(SpecialValue::PositiveInfinity) => f64::INFINITY,
            Ieee11073Float::Special(SpecialValue::NegativeInfinity) => f64::NEG_INFINITY,
            Ieee11073Float::Special(_) => f64::NAN,
        }
    }
}

/// Calendar components exactly as the device sent them. Zero year, month or
/// day means "not known" on the wire and is kept as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
}

impl DeviceDateTime {
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year.into(), self.month.into(), self.day.into())?.and_hms_opt(
            self.hours.into(),
            self.minutes.into(),
            self.seconds.into(),
        )
    }
}

impl fmt::Display for DeviceDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hours, self.minutes, self.seconds
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Float(Ieee11073Float),
    DateTime(DeviceDateTime),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => v.as_number(),
            FieldValue::DateTime(_) => None,
        }
    }
}

impl From<Ieee11073Float> for FieldValue {
    fn from(v: Ieee11073Float) -> Self {
        FieldValue::Float(v)
    }
}

impl From<DeviceDateTime> for FieldValue {
    fn from(v: DeviceDateTime) -> Self {
        FieldValue::DateTime(v)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Float(Ieee11073Float::Number(v)) => write!(f, "{v}"),
            FieldValue::Float(Ieee11073Float::Special(s)) => f.write_str(s.as_str()),
            FieldValue::DateTime(dt) => write!(f, "{dt}"),
        }
    }
}
