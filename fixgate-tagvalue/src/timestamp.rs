/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! FIX UTCTimestamp formatting and strict parsing.
//!
//! SendingTime (tag 52) and OrigSendingTime (tag 122) carry UTC timestamps in
//! `YYYYMMDD-HH:MM:SS` form with an optional fraction whose width is fixed by
//! configuration: none, milliseconds, microseconds, or nanoseconds. The
//! session layer rejects messages whose SendingTime fails to parse, so the
//! parser here is strict about both shape and field ranges.

use arrayvec::ArrayString;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use fixgate_core::error::DecodeError;
use fixgate_core::tags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum formatted length: `YYYYMMDD-HH:MM:SS.sssssssss`.
pub const TIMESTAMP_MAX_LEN: usize = 27;

/// Fraction width of formatted SendingTime values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampPrecision {
    /// Whole seconds: `YYYYMMDD-HH:MM:SS`.
    Seconds,
    /// Milliseconds: `YYYYMMDD-HH:MM:SS.sss`.
    #[default]
    Millis,
    /// Microseconds: `YYYYMMDD-HH:MM:SS.ssssss`.
    Micros,
    /// Nanoseconds: `YYYYMMDD-HH:MM:SS.sssssssss`.
    Nanos,
}

impl TimestampPrecision {
    /// Number of fraction digits after the decimal point.
    #[must_use]
    pub const fn fraction_digits(self) -> usize {
        match self {
            Self::Seconds => 0,
            Self::Millis => 3,
            Self::Micros => 6,
            Self::Nanos => 9,
        }
    }

    /// Formatted length of a timestamp at this precision.
    #[must_use]
    pub const fn formatted_len(self) -> usize {
        match self {
            Self::Seconds => 17,
            Self::Millis => 21,
            Self::Micros => 24,
            Self::Nanos => 27,
        }
    }
}

/// UTC timestamp with nanosecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UtcTimestamp {
    /// Nanoseconds since the Unix epoch.
    nanos_since_epoch: u64,
}

impl UtcTimestamp {
    /// Creates a timestamp from nanoseconds since the Unix epoch.
    #[inline]
    #[must_use]
    pub const fn from_epoch_nanos(nanos: u64) -> Self {
        Self {
            nanos_since_epoch: nanos,
        }
    }

    /// Returns nanoseconds since the Unix epoch.
    #[inline]
    #[must_use]
    pub const fn epoch_nanos(self) -> u64 {
        self.nanos_since_epoch
    }

    /// Formats the timestamp at the given precision.
    #[must_use]
    pub fn format(self, precision: TimestampPrecision) -> ArrayString<TIMESTAMP_MAX_LEN> {
        let dt = DateTime::from_timestamp_nanos(self.nanos_since_epoch as i64);
        let spec = match precision {
            TimestampPrecision::Seconds => "%Y%m%d-%H:%M:%S",
            TimestampPrecision::Millis => "%Y%m%d-%H:%M:%S%.3f",
            TimestampPrecision::Micros => "%Y%m%d-%H:%M:%S%.6f",
            TimestampPrecision::Nanos => "%Y%m%d-%H:%M:%S%.9f",
        };

        let mut buf = ArrayString::new();
        let _ = std::fmt::write(&mut buf, format_args!("{}", dt.format(spec)));
        buf
    }

    /// Parses a FIX UTCTimestamp value.
    ///
    /// Accepts any of the four configured fraction widths; the fraction width
    /// is inferred from the value length.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidFieldValue` (tag 52) if the value is not
    /// a well-formed UTC timestamp.
    pub fn parse(value: &[u8]) -> Result<Self, DecodeError> {
        let invalid = |reason: &str| DecodeError::InvalidFieldValue {
            tag: tags::SENDING_TIME,
            reason: reason.to_string(),
        };

        let s = std::str::from_utf8(value).map_err(|_| invalid("not ascii"))?;

        let (date_time, fraction) = match s.len() {
            17 => (s, ""),
            21 | 24 | 27 => {
                if s.as_bytes()[17] != b'.' {
                    return Err(invalid("missing fraction separator"));
                }
                (&s[..17], &s[18..])
            }
            _ => return Err(invalid("unexpected length")),
        };

        let date = NaiveDate::parse_from_str(&date_time[..8], "%Y%m%d")
            .map_err(|_| invalid("invalid date"))?;
        let time = NaiveTime::parse_from_str(&date_time[9..], "%H:%M:%S")
            .map_err(|_| invalid("invalid time"))?;
        if date_time.as_bytes()[8] != b'-' {
            return Err(invalid("missing date-time separator"));
        }

        let mut frac_nanos: u64 = 0;
        if !fraction.is_empty() {
            if !fraction.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("non-digit fraction"));
            }
            let scale = 10u64.pow(9 - fraction.len() as u32);
            frac_nanos = fraction.parse::<u64>().map_err(|_| invalid("fraction"))? * scale;
        }

        let dt = NaiveDateTime::new(date, time);
        let secs = dt.and_utc().timestamp();
        if secs < 0 {
            return Err(invalid("before epoch"));
        }

        Ok(Self::from_epoch_nanos(
            secs as u64 * 1_000_000_000 + u64::from(dt.and_utc().nanosecond()) + frac_nanos,
        ))
    }
}

impl fmt::Display for UtcTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(TimestampPrecision::Millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precision_widths() {
        assert_eq!(TimestampPrecision::Seconds.fraction_digits(), 0);
        assert_eq!(TimestampPrecision::Millis.fraction_digits(), 3);
        assert_eq!(TimestampPrecision::Micros.fraction_digits(), 6);
        assert_eq!(TimestampPrecision::Nanos.fraction_digits(), 9);
        assert_eq!(TimestampPrecision::Seconds.formatted_len(), 17);
        assert_eq!(TimestampPrecision::Nanos.formatted_len(), 27);
    }

    #[test]
    fn test_format_epoch() {
        let ts = UtcTimestamp::from_epoch_nanos(0);
        assert_eq!(
            ts.format(TimestampPrecision::Seconds).as_str(),
            "19700101-00:00:00"
        );
        assert_eq!(
            ts.format(TimestampPrecision::Millis).as_str(),
            "19700101-00:00:00.000"
        );
        assert_eq!(
            ts.format(TimestampPrecision::Nanos).as_str(),
            "19700101-00:00:00.000000000"
        );
    }

    #[test]
    fn test_format_parse_roundtrip() {
        let ts = UtcTimestamp::from_epoch_nanos(1_700_000_123_456_789_012);
        for precision in [
            TimestampPrecision::Millis,
            TimestampPrecision::Micros,
            TimestampPrecision::Nanos,
        ] {
            let formatted = ts.format(precision);
            let parsed = UtcTimestamp::parse(formatted.as_bytes()).unwrap();
            let truncation = 10u64.pow(9 - precision.fraction_digits() as u32);
            assert_eq!(parsed.epoch_nanos(), ts.epoch_nanos() / truncation * truncation);
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(UtcTimestamp::parse(b"").is_err());
        assert!(UtcTimestamp::parse(b"not a timestamp!!").is_err());
        assert!(UtcTimestamp::parse(b"20260127 10:00:00").is_err());
        assert!(UtcTimestamp::parse(b"20260127-10:00:00.12").is_err());
        assert!(UtcTimestamp::parse(b"20260127-10:00:00.abc").is_err());
    }

    #[test]
    fn test_parse_rejects_out_of_range_fields() {
        assert!(UtcTimestamp::parse(b"20261301-10:00:00").is_err());
        assert!(UtcTimestamp::parse(b"20260132-10:00:00").is_err());
        assert!(UtcTimestamp::parse(b"20260127-25:00:00").is_err());
        assert!(UtcTimestamp::parse(b"20260127-10:61:00").is_err());
    }

    #[test]
    fn test_parse_accepts_all_widths() {
        assert!(UtcTimestamp::parse(b"20260127-10:00:00").is_ok());
        assert!(UtcTimestamp::parse(b"20260127-10:00:00.123").is_ok());
        assert!(UtcTimestamp::parse(b"20260127-10:00:00.123456").is_ok());
        assert!(UtcTimestamp::parse(b"20260127-10:00:00.123456789").is_ok());
    }
}
