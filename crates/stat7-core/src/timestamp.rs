//! ISO-8601 UTC timestamps with millisecond precision (spec §3, §6).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// A UTC timestamp truncated to millisecond precision, the unit spec §3
/// mandates for canonical serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(i128);

impl Timestamp {
    /// Construct from the current wall clock, truncated to milliseconds.
    pub fn now() -> Self {
        Self::from_datetime(OffsetDateTime::now_utc())
    }

    pub fn from_datetime(dt: OffsetDateTime) -> Self {
        let nanos = dt.unix_timestamp_nanos();
        Timestamp(nanos - nanos.rem_euclid(1_000_000))
    }

    pub fn from_unix_millis(millis: i64) -> Self {
        Timestamp(millis as i128 * 1_000_000)
    }

    pub fn unix_millis(&self) -> i64 {
        (self.0 / 1_000_000) as i64
    }

    /// Render as ISO-8601 UTC with millisecond precision, e.g.
    /// `2026-07-28T12:34:56.789Z`.
    pub fn to_canonical_string(&self) -> String {
        let dt = OffsetDateTime::from_unix_timestamp_nanos(self.0)
            .expect("Timestamp always holds a valid instant");
        let formatted = dt
            .format(&Rfc3339)
            .expect("RFC3339 formatting cannot fail for a valid OffsetDateTime");
        // `time`'s Rfc3339 formatter renders nanosecond precision only when
        // non-zero; since we truncate to whole milliseconds we always render
        // exactly 3 fractional digits for spec compliance.
        ensure_millis(&formatted, dt)
    }

    pub fn parse(s: &str) -> Result<Self> {
        let dt = OffsetDateTime::parse(s, &Rfc3339)
            .map_err(|e| Error::InvalidTimestamp(e.to_string()))?;
        Ok(Self::from_datetime(dt))
    }
}

fn ensure_millis(_formatted: &str, dt: OffsetDateTime) -> String {
    let millis = dt.millisecond();
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        dt.year(),
        u8::from(dt.month()),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second(),
        millis
    )
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_canonical_string() {
        let ts = Timestamp::from_unix_millis(1_700_000_000_123);
        let s = ts.to_canonical_string();
        let parsed = Timestamp::parse(&s).unwrap();
        assert_eq!(ts, parsed);
    }

    #[test]
    fn renders_three_fractional_digits() {
        let ts = Timestamp::from_unix_millis(1_700_000_000_000);
        assert!(ts.to_canonical_string().ends_with(".000Z"));
    }
}
