//! Inclusive range of days for reconciling and listing events.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::date_key::DateKey;
use crate::error::{DayDialError, DayDialResult};

/// Inclusive range of local days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    pub from: DateKey,
    pub to: DateKey,
}

impl DateRange {
    pub fn new(from: DateKey, to: DateKey) -> DayDialResult<Self> {
        if from > to {
            return Err(DayDialError::InvalidDateKey(format!("{from}..{to}")));
        }
        Ok(DateRange { from, to })
    }

    pub fn single(day: DateKey) -> Self {
        DateRange { from: day, to: day }
    }

    /// `past` days before `today` through `future` days after it.
    pub fn around(today: DateKey, past: i64, future: i64) -> Self {
        DateRange {
            from: today.add_days(-past.max(0)),
            to: today.add_days(future.max(0)),
        }
    }

    pub fn contains(&self, day: DateKey) -> bool {
        day >= self.from && day <= self.to
    }

    pub fn days(&self) -> impl Iterator<Item = DateKey> + '_ {
        let span = (self.to.date() - self.from.date()).num_days();
        (0..=span).map(move |offset| self.from.add_days(offset))
    }

    /// Half-open UTC window `[midnight(from), midnight(to + 1))` in `tz`.
    pub fn utc_window(&self, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.from.start_of_day(tz), self.to.add_days(1).start_of_day(tz))
    }
}
