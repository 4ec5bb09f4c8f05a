//! Decoding of the Heart Rate Measurement characteristic (0x2A37).

use std::ops::RangeInclusive;

use chrono::{DateTime, Local};

use crate::error::DecodeError;

const VALUE_FORMAT_U16: u8 = 0b0000_0001;
const CONTACT_DETECTED: u8 = 0b0000_0010;
const CONTACT_SUPPORTED: u8 = 0b0000_0100;

/// Range of heart rates a wrist or chest sensor can plausibly report.
pub const PLAUSIBLE_BPM: RangeInclusive<u16> = 40..=240;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorContact {
    Unsupported,
    NotDetected,
    Detected,
}

impl SensorContact {
    fn from_flags(flags: u8) -> Self {
        if flags & CONTACT_SUPPORTED == 0 {
            SensorContact::Unsupported
        } else if flags & CONTACT_DETECTED != 0 {
            SensorContact::Detected
        } else {
            SensorContact::NotDetected
        }
    }
}

/// One decoded measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartRateSample {
    pub heart_rate: u16,
    pub sensor_contact: SensorContact,
    /// Flags byte as received, kept for diagnostics.
    pub raw_flags: u8,
    pub captured_at: DateTime<Local>,
}

impl HeartRateSample {
    #[inline]
    pub fn is_plausible(&self) -> bool {
        PLAUSIBLE_BPM.contains(&self.heart_rate)
    }
}

/// Decode a measurement notification.
///
/// Only the flags byte and the heart rate value are read. Energy expended
/// and RR-interval fields, when present, are ignored.
pub fn parse(payload: &[u8], captured_at: DateTime<Local>) -> Result<HeartRateSample, DecodeError> {
    let (flags, value) = match payload {
        [flags, value, ..] => (*flags, *value),
        _ => {
            return Err(DecodeError::TooShort {
                expected: 2,
                actual: payload.len(),
            })
        }
    };

    let heart_rate = if flags & VALUE_FORMAT_U16 != 0 {
        match payload.get(2) {
            Some(hi) => u16::from_le_bytes([value, *hi]),
            None => {
                return Err(DecodeError::TooShort {
                    expected: 3,
                    actual: payload.len(),
                })
            }
        }
    } else {
        u16::from(value)
    };

    Ok(HeartRateSample {
        heart_rate,
        sensor_contact: SensorContact::from_flags(flags),
        raw_flags: flags,
        captured_at,
    })
}
