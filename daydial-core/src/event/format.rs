//! Human-readable time strings for events.

use crate::event::Event;

const MINUTES_PER_DAY: i64 = 24 * 60;

fn to_minutes(hours: f64) -> i64 {
    (hours * 60.0).round() as i64
}

/// 12-hour clock reading of a fractional hour, e.g. `9.5` -> `"9:30 AM"`.
/// Hours past 24 wrap onto the next day (`25.0` -> `"1:00 AM"`).
pub fn format_hour(hours: f64) -> String {
    let minutes = to_minutes(hours).rem_euclid(MINUTES_PER_DAY);
    let (hour, minute) = (minutes / 60, minutes % 60);
    let (hour12, period) = match hour {
        0 => (12, "AM"),
        1..=11 => (hour, "AM"),
        12 => (12, "PM"),
        _ => (hour - 12, "PM"),
    };
    format!("{}:{:02} {}", hour12, minute, period)
}

/// Compact duration, e.g. `1.5` -> `"1h 30m"`, `0.75` -> `"45m"`.
pub fn format_duration(hours: f64) -> String {
    let minutes = to_minutes(hours).max(0);
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{}m", m),
        (h, 0) => format!("{}h", h),
        (h, m) => format!("{}h {}m", h, m),
    }
}

impl Event {
    /// `"9:00 AM - 9:30 AM"`; an end past midnight is marked `(+1)`.
    pub fn time_range_string(&self) -> String {
        let crosses_midnight =
            to_minutes(self.end_hour) / MINUTES_PER_DAY > to_minutes(self.start_hour) / MINUTES_PER_DAY
                && to_minutes(self.end_hour) % MINUTES_PER_DAY != 0;
        let suffix = if crosses_midnight { " (+1)" } else { "" };
        format!(
            "{} - {}{}",
            format_hour(self.start_hour),
            format_hour(self.end_hour),
            suffix
        )
    }

    pub fn duration_string(&self) -> String {
        format_duration(self.duration())
    }
}
