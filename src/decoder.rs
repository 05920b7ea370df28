//! Fixed-width IEEE-11073 encodings used by medical BLE profiles.
//!
//! All multi-byte values are little-endian, as on the GATT wire. Reserved bit
//! patterns decode to [`SpecialValue`] sentinels; the only failure is a buffer
//! that ends before the field does.

use std::fmt;
use std::str::FromStr;

use anyhow::{Error, bail};

use crate::error::DecodeError;
use crate::measurement::{DeviceDateTime, FieldValue, Ieee11073Float, SpecialValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecoderKind {
    Sfloat16,
    Ieee11073Float32,
    DateTime,
}

impl DecoderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecoderKind::Sfloat16 => "SFLOAT16",
            DecoderKind::Ieee11073Float32 => "IEEE11073_32",
            DecoderKind::DateTime => "DATETIME",
        }
    }

    /// Encoded width in bytes.
    pub const fn width(&self) -> usize {
        match self {
            DecoderKind::Sfloat16 => 2,
            DecoderKind::Ieee11073Float32 => 4,
            DecoderKind::DateTime => 7,
        }
    }
}

impl fmt::Display for DecoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecoderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SFLOAT16" => Ok(DecoderKind::Sfloat16),
            "IEEE11073_32" => Ok(DecoderKind::Ieee11073Float32),
            "DATETIME" => Ok(DecoderKind::DateTime),
            _ => bail!("unknown decoder kind: {}", s),
        }
    }
}

// Reserved SFLOAT16 raw values (exponent 0).
const SFLOAT_NAN: u16 = 0x07ff;
const SFLOAT_NRES: u16 = 0x0800;
const SFLOAT_POSITIVE_INFINITY: u16 = 0x07fe;
const SFLOAT_NEGATIVE_INFINITY: u16 = 0x0802;
const SFLOAT_RESERVED: u16 = 0x0801;

// Reserved FLOAT32 raw values (exponent 0).
const FLOAT_NAN: u32 = 0x007f_ffff;
const FLOAT_NRES: u32 = 0x0080_0000;
const FLOAT_POSITIVE_INFINITY: u32 = 0x007f_fffe;
const FLOAT_NEGATIVE_INFINITY: u32 = 0x0080_0002;
const FLOAT_RESERVED: u32 = 0x0080_0001;

/// Decodes whichever encoding `kind` names.
pub fn decode(kind: DecoderKind, buf: &[u8], offset: usize) -> Result<FieldValue, DecodeError> {
    match kind {
        DecoderKind::Sfloat16 => decode_sfloat16(buf, offset).map(FieldValue::from),
        DecoderKind::Ieee11073Float32 => decode_float32(buf, offset).map(FieldValue::from),
        DecoderKind::DateTime => decode_date_time(buf, offset).map(FieldValue::from),
    }
}

/// 16-bit SFLOAT: 4-bit signed exponent, 12-bit signed mantissa.
pub fn decode_sfloat16(buf: &[u8], offset: usize) -> Result<Ieee11073Float, DecodeError> {
    let bytes = field_bytes::<2>(DecoderKind::Sfloat16, buf, offset)?;
    let raw = u16::from_le_bytes(bytes);

    let special = match raw {
        SFLOAT_NAN => Some(SpecialValue::NaN),
        SFLOAT_NRES => Some(SpecialValue::NRes),
        SFLOAT_POSITIVE_INFINITY => Some(SpecialValue::PositiveInfinity),
        SFLOAT_NEGATIVE_INFINITY => Some(SpecialValue::NegativeInfinity),
        SFLOAT_RESERVED => Some(SpecialValue::Reserved),
        _ => None,
    };
    if let Some(special) = special {
        return Ok(Ieee11073Float::Special(special));
    }

    let mantissa = sign_extend(u32::from(raw & 0x0fff), 12);
    let exponent = sign_extend(u32::from(raw >> 12), 4);

    Ok(Ieee11073Float::Number(scale(mantissa, exponent)))
}

/// 32-bit FLOAT: 8-bit signed exponent, 24-bit signed mantissa.
pub fn decode_float32(buf: &[u8], offset: usize) -> Result<Ieee11073Float, DecodeError> {
    let bytes = field_bytes::<4>(DecoderKind::Ieee11073Float32, buf, offset)?;
    let raw = u32::from_le_bytes(bytes);

    let special = match raw {
        FLOAT_NAN => Some(SpecialValue::NaN),
        FLOAT_NRES => Some(SpecialValue::NRes),
        FLOAT_POSITIVE_INFINITY => Some(SpecialValue::PositiveInfinity),
        FLOAT_NEGATIVE_INFINITY => Some(SpecialValue::NegativeInfinity),
        FLOAT_RESERVED => Some(SpecialValue::Reserved),
        _ => None,
    };
    if let Some(special) = special {
        return Ok(Ieee11073Float::Special(special));
    }

    let mantissa = sign_extend(raw & 0x00ff_ffff, 24);
    let exponent = i32::from(bytes[3] as i8);

    Ok(Ieee11073Float::Number(scale(mantissa, exponent)))
}

/// Date Time characteristic layout: year (u16), month, day, hours, minutes, seconds.
pub fn decode_date_time(buf: &[u8], offset: usize) -> Result<DeviceDateTime, DecodeError> {
    let bytes = field_bytes::<7>(DecoderKind::DateTime, buf, offset)?;

    Ok(DeviceDateTime {
        year: u16::from_le_bytes([bytes[0], bytes[1]]),
        month: bytes[2],
        day: bytes[3],
        hours: bytes[4],
        minutes: bytes[5],
        seconds: bytes[6],
    })
}

fn field_bytes<const N: usize>(
    kind: DecoderKind,
    buf: &[u8],
    offset: usize,
) -> Result<[u8; N], DecodeError> {
    offset
        .checked_add(N)
        .and_then(|end| buf.get(offset..end))
        .and_then(|slice| slice.try_into().ok())
        .ok_or(DecodeError {
            kind,
            offset,
            width: N,
            len: buf.len(),
        })
}

fn sign_extend(v: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((v << shift) as i32) >> shift
}

// Negative exponents divide, so 366e-1 is the nearest f64 to 36.6.
fn scale(mantissa: i32, exponent: i32) -> f64 {
    let magnitude = 10f64.powi(exponent.abs());
    if exponent < 0 {
        f64::from(mantissa) / magnitude
    } else {
        f64::from(mantissa) * magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_sfloat16(mantissa: i16, exponent: i8) -> [u8; 2] {
        let raw = ((exponent as u16 & 0x000f) << 12) | (mantissa as u16 & 0x0fff);
        raw.to_le_bytes()
    }

    #[test]
    fn test_sfloat16_simple_values() {
        // 120 mmHg, exponent 0
        assert_eq!(
            decode_sfloat16(&[0x78, 0x00], 0).unwrap(),
            Ieee11073Float::Number(120.0)
        );
        // 366 * 10^-1
        assert_eq!(
            decode_sfloat16(&encode_sfloat16(366, -1), 0).unwrap(),
            Ieee11073Float::Number(36.6)
        );
        // -5 * 10^2
        assert_eq!(
            decode_sfloat16(&encode_sfloat16(-5, 2), 0).unwrap(),
            Ieee11073Float::Number(-500.0)
        );
    }

    #[test]
    fn test_sfloat16_round_trip_within_precision() {
        for exponent in -8i8..=7 {
            for mantissa in (-2045i16..=2045).step_by(97) {
                let decoded = decode_sfloat16(&encode_sfloat16(mantissa, exponent), 0)
                    .unwrap()
                    .as_number()
                    .unwrap();
                let expected = f64::from(mantissa) * 10f64.powi(i32::from(exponent));
                let tolerance = 10f64.powi(i32::from(exponent)) * 1e-9;
                assert!(
                    (decoded - expected).abs() <= tolerance.max(f64::EPSILON),
                    "m={mantissa} e={exponent}: {decoded} != {expected}"
                );
            }
        }
    }

    #[test]
    fn test_sfloat16_reserved_patterns() {
        let cases = [
            (0x07ffu16, SpecialValue::NaN),
            (0x0800, SpecialValue::NRes),
            (0x07fe, SpecialValue::PositiveInfinity),
            (0x0802, SpecialValue::NegativeInfinity),
            (0x0801, SpecialValue::Reserved),
        ];
        for (raw, expected) in cases {
            assert_eq!(
                decode_sfloat16(&raw.to_le_bytes(), 0).unwrap(),
                Ieee11073Float::Special(expected)
            );
        }
    }

    #[test]
    fn test_float32_values() {
        // 3660 * 10^-2 = 36.6
        let mut buf = vec![0xff];
        buf.extend_from_slice(&[0x4c, 0x0e, 0x00, 0xfe]);
        assert_eq!(
            decode_float32(&buf, 1).unwrap(),
            Ieee11073Float::Number(36.6)
        );

        // mantissa -1, exponent 0
        assert_eq!(
            decode_float32(&[0xff, 0xff, 0xff, 0x00], 0).unwrap(),
            Ieee11073Float::Number(-1.0)
        );
    }

    #[test]
    fn test_float32_reserved_patterns() {
        let cases = [
            (0x007f_ffffu32, SpecialValue::NaN),
            (0x0080_0000, SpecialValue::NRes),
            (0x007f_fffe, SpecialValue::PositiveInfinity),
            (0x0080_0002, SpecialValue::NegativeInfinity),
            (0x0080_0001, SpecialValue::Reserved),
        ];
        for (raw, expected) in cases {
            assert_eq!(
                decode_float32(&raw.to_le_bytes(), 0).unwrap(),
                Ieee11073Float::Special(expected)
            );
        }

        // Same mantissa with a nonzero exponent is an ordinary number.
        assert!(decode_float32(&0x0180_0000u32.to_le_bytes(), 0).unwrap().as_number().is_some());
    }

    #[test]
    fn test_date_time() {
        let buf = [0xe8, 0x07, 0x05, 0x1f, 0x17, 0x3b, 0x1e];
        let dt = decode_date_time(&buf, 0).unwrap();
        assert_eq!(dt.year, 2024);
        assert_eq!(dt.month, 5);
        assert_eq!(dt.day, 31);
        assert_eq!(dt.to_string(), "2024-05-31T23:59:30");
        assert!(dt.to_naive().is_some());
    }

    #[test]
    fn test_buffer_too_short() {
        let err = decode_sfloat16(&[0x00, 0x78], 1).unwrap_err();
        assert_eq!(
            err,
            DecodeError {
                kind: DecoderKind::Sfloat16,
                offset: 1,
                width: 2,
                len: 2,
            }
        );
        assert!(decode_date_time(&[0; 6], 0).is_err());
        assert!(decode_float32(&[0; 4], usize::MAX).is_err());
    }

    #[test]
    fn test_decoder_kind_from_str() {
        assert_eq!(
            "IEEE11073_32".parse::<DecoderKind>().unwrap(),
            DecoderKind::Ieee11073Float32
        );
        assert!("FLOAT64".parse::<DecoderKind>().is_err());
    }
}
