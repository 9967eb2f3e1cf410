//! Snapshot timestamps.
//!
//! A snapshot is identified by the local wall-clock moment it was taken,
//! rendered as a fixed-width, lexicographically sortable string:
//!
//! ```text
//! 2016-09-12_18_04_47_311
//! YYYY-MM-DD_HH_MM_SS_mmm
//! ```

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, TimeDelta, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

/// Length of an encoded timestamp.
pub const STAMP_LEN: usize = 23;

/// Positions of the separators within an encoded timestamp.
const SEPARATORS: [(usize, u8); 6] = [
    (4, b'-'),
    (7, b'-'),
    (10, b'_'),
    (13, b'_'),
    (16, b'_'),
    (19, b'_'),
];

/// A millisecond-resolution local timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Stamp(NaiveDateTime);

impl Stamp {
    /// Wrap a date-time, truncating it to millisecond resolution.
    pub fn new(at: NaiveDateTime) -> Self {
        let nanos = at.nanosecond() % 1_000_000_000;
        let truncated = nanos - nanos % 1_000_000;
        Self(at.with_nanosecond(truncated).unwrap_or(at))
    }

    /// The current local moment.
    pub fn now() -> Self {
        Self::new(Local::now().naive_local())
    }

    /// Convert a filesystem time into a local stamp.
    pub fn from_system_time(time: SystemTime) -> Self {
        let local: chrono::DateTime<Local> = time.into();
        Self::new(local.naive_local())
    }

    /// The underlying date-time.
    pub fn as_datetime(&self) -> NaiveDateTime {
        self.0
    }

    /// Time elapsed from `self` until `later` (negative if `later` is earlier).
    pub fn until(&self, later: Stamp) -> TimeDelta {
        later.0 - self.0
    }

    /// This stamp moved back by a number of whole days, or `None` when the
    /// result falls outside the representable calendar.
    pub fn minus_days(&self, days: u32) -> Option<Self> {
        TimeDelta::try_days(i64::from(days))
            .and_then(|delta| self.0.checked_sub_signed(delta))
            .map(Self)
    }

    /// Decode a 23-character timestamp. Returns `None` unless the text is
    /// well-formed and names a real calendar moment.
    pub fn parse(text: &str) -> Option<Self> {
        if !has_stamp_shape(text) {
            return None;
        }
        let field = |range: std::ops::Range<usize>| text[range].parse::<u32>().ok();

        let year = field(0..4)? as i32;
        let month = field(5..7)?;
        let day = field(8..10)?;
        let hour = field(11..13)?;
        let minute = field(14..16)?;
        let second = field(17..19)?;
        let milli = field(20..23)?;

        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_milli_opt(hour, minute, second, milli))
            .map(Self)
    }
}

/// Whether `text` begins with something shaped like a timestamp
/// (digits and separators in the right places), valid date or not.
pub fn has_stamp_shape(text: &str) -> bool {
    let bytes = text.as_bytes();
    if bytes.len() < STAMP_LEN {
        return false;
    }
    bytes[..STAMP_LEN].iter().enumerate().all(|(i, b)| {
        match SEPARATORS.iter().find(|(pos, _)| *pos == i) {
            Some((_, sep)) => b == sep,
            None => b.is_ascii_digit(),
        }
    })
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.0;
        write!(
            f,
            "{:04}-{:02}-{:02}_{:02}_{:02}_{:02}_{:03}",
            t.year(),
            t.month(),
            t.day(),
            t.hour(),
            t.minute(),
            t.second(),
            (t.nanosecond() % 1_000_000_000) / 1_000_000
        )
    }
}

impl FromStr for Stamp {
    type Err = crate::SnapshotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != STAMP_LEN {
            return Err(crate::SnapshotError::InvalidName(s.to_string()));
        }
        Self::parse(s).ok_or_else(|| crate::SnapshotError::InvalidName(s.to_string()))
    }
}

impl TryFrom<String> for Stamp {
    type Error = crate::SnapshotError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Stamp> for String {
    fn from(value: Stamp) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, ms: u32) -> Stamp {
        Stamp::new(
            NaiveDate::from_ymd_opt(y, mo, d)
                .unwrap()
                .and_hms_milli_opt(h, mi, s, ms)
                .unwrap(),
        )
    }

    #[test]
    fn test_format_is_fixed_width() {
        let stamp = at(2016, 9, 12, 18, 4, 47, 311);
        assert_eq!(stamp.to_string(), "2016-09-12_18_04_47_311");

        let early = at(2001, 1, 2, 3, 4, 5, 6);
        assert_eq!(early.to_string(), "2001-01-02_03_04_05_006");
        assert_eq!(early.to_string().len(), STAMP_LEN);
    }

    #[test]
    fn test_parse_roundtrip() {
        let stamp = at(2025, 3, 16, 11, 9, 23, 754);
        assert_eq!(Stamp::parse(&stamp.to_string()), Some(stamp));
    }

    #[test]
    fn test_parse_ignores_trailing_text() {
        let parsed = Stamp::parse("2025-03-16_11_09_23_754.cs.1200.gz").unwrap();
        assert_eq!(parsed, at(2025, 3, 16, 11, 9, 23, 754));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Stamp::parse("2025-03-16 11:09:23.754").is_none());
        assert!(Stamp::parse("2025-03-16_11_09_23").is_none());
        assert!(Stamp::parse(".filter.json").is_none());
        assert!(Stamp::parse("").is_none());
    }

    #[test]
    fn test_shape_without_valid_date() {
        let text = "2025-13-40_11_09_23_754";
        assert!(has_stamp_shape(text));
        assert!(Stamp::parse(text).is_none());
    }

    #[test]
    fn test_new_truncates_to_millis() {
        let raw = NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_nano_opt(7, 8, 9, 123_456_789)
            .unwrap();
        assert_eq!(Stamp::new(raw).to_string(), "2024-05-06_07_08_09_123");
    }

    #[test]
    fn test_ordering_matches_text_ordering() {
        let a = at(2024, 12, 31, 23, 59, 59, 999);
        let b = at(2025, 1, 1, 0, 0, 0, 0);
        assert!(a < b);
        assert!(a.to_string() < b.to_string());
    }

    #[test]
    fn test_until_and_minus_days() {
        let a = at(2024, 1, 10, 12, 0, 0, 0);
        let b = at(2024, 1, 10, 12, 0, 30, 0);
        assert_eq!(a.until(b).num_seconds(), 30);
        assert_eq!(b.until(a).num_seconds(), -30);
        assert_eq!(a.minus_days(9), Some(at(2024, 1, 1, 12, 0, 0, 0)));
    }

    #[test]
    fn test_minus_days_out_of_range() {
        let a = at(2024, 1, 10, 12, 0, 0, 0);
        assert_eq!(a.minus_days(u32::MAX), None);
    }

    #[test]
    fn test_serde_as_string() {
        let stamp = at(2024, 2, 29, 1, 2, 3, 4);
        let json = serde_json::to_string(&stamp).unwrap();
        assert_eq!(json, "\"2024-02-29_01_02_03_004\"");
        let back: Stamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stamp);
        assert!(serde_json::from_str::<Stamp>("\"yesterday\"").is_err());
    }
}
