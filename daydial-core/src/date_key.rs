//! Day partition keys.
//!
//! Every event belongs to exactly one local calendar day. The day is stored as
//! a normalized `YYYY-MM-DD` string and resolved against the configured time
//! zone whenever an absolute instant is needed.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{DayDialError, DayDialResult};

const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DateKey(NaiveDate);

impl DateKey {
    pub fn new(date: NaiveDate) -> Self {
        DateKey(date)
    }

    pub fn parse(s: &str) -> DayDialResult<Self> {
        NaiveDate::parse_from_str(s.trim(), DATE_KEY_FORMAT)
            .map(DateKey)
            .map_err(|_| DayDialError::InvalidDateKey(s.to_string()))
    }

    /// The local day that contains `instant`.
    pub fn of_instant(instant: DateTime<Utc>, tz: Tz) -> Self {
        DateKey(instant.with_timezone(&tz).date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    pub fn add_days(&self, days: i64) -> Self {
        DateKey(self.0 + Duration::days(days))
    }

    /// Midnight of this day in `tz`, as an absolute instant.
    pub fn start_of_day(&self, tz: Tz) -> DateTime<Utc> {
        local_to_utc(tz, self.0.and_time(chrono::NaiveTime::MIN))
    }

    /// Absolute instant at wall-clock `hours` (fractional) of this day in `tz`.
    /// `24.0` is the next day's midnight.
    pub fn instant_at(&self, hours: f64, tz: Tz) -> DateTime<Utc> {
        let offset = Duration::seconds((hours * 3600.0).round() as i64);
        local_to_utc(tz, self.0.and_time(chrono::NaiveTime::MIN) + offset)
    }
}

/// Resolve a local wall-clock time to UTC.
///
/// Ambiguous times (DST fall-back) resolve to the earlier instant; times that
/// fall into a DST gap resolve to the first valid instant after the gap.
pub(crate) fn local_to_utc(tz: Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
        return dt.with_timezone(&Utc);
    }

    // Gaps are at most a few hours; walk forward in minute steps until valid.
    (1..=180)
        .map(|m| naive + Duration::minutes(m))
        .find_map(|candidate| tz.from_local_datetime(&candidate).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_KEY_FORMAT))
    }
}

impl FromStr for DateKey {
    type Err = DayDialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DateKey::parse(s)
    }
}

impl Serialize for DateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        DateKey::parse(&s).map_err(serde::de::Error::custom)
    }
}
