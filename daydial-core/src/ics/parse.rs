//! ICS parsing for external calendar records.

use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use icalendar::{
    DatePerhapsTime,
    parser::{read_calendar, unfold},
};

use crate::calendar::ExternalRecord;
use crate::date_key::local_to_utc;

/// Parse ICS content into an external record of `calendar_id`.
///
/// Floating times and all-day dates are resolved in `tz`.
pub fn parse_ics(content: &str, calendar_id: &str, tz: Tz) -> Option<ExternalRecord> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).ok()?;
    let vevent = calendar.components.iter().find(|c| c.name == "VEVENT")?;

    let id = vevent.find_prop("UID")?.val.to_string();
    let title = vevent
        .find_prop("SUMMARY")
        .map(|p| p.val.to_string())
        .unwrap_or_else(|| "(No title)".to_string());
    let start = to_utc(DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?, tz);
    let end = vevent
        .find_prop("DTEND")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(|dpt| to_utc(dpt, tz))
        .unwrap_or(start);

    let notes = vevent.find_prop("DESCRIPTION").map(|p| p.val.to_string());

    let last_modified = vevent
        .find_prop("LAST-MODIFIED")
        .or_else(|| vevent.find_prop("DTSTAMP"))
        .and_then(|p| parse_utc_stamp(p.val.as_ref()))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let alarms: Vec<i64> = vevent
        .components
        .iter()
        .filter(|c| c.name == "VALARM")
        .filter_map(|alarm| {
            let trigger = alarm.find_prop("TRIGGER")?.val.as_ref();
            parse_trigger_offset(trigger)
        })
        .collect();

    Some(ExternalRecord {
        id,
        calendar_id: calendar_id.to_string(),
        title,
        notes,
        start,
        end,
        alarms,
        last_modified,
    })
}

fn to_utc(dpt: DatePerhapsTime, tz: Tz) -> DateTime<Utc> {
    match dpt {
        DatePerhapsTime::Date(d) => local_to_utc(tz, d.and_time(NaiveTime::MIN)),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            icalendar::CalendarDateTime::Utc(dt) => dt,
            icalendar::CalendarDateTime::Floating(naive) => local_to_utc(tz, naive),
            icalendar::CalendarDateTime::WithTimezone { date_time, tzid } => {
                let zone = tzid.parse::<Tz>().unwrap_or(tz);
                local_to_utc(zone, date_time)
            }
        },
    }
}

fn parse_utc_stamp(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim_end_matches('Z'), "%Y%m%dT%H%M%S")
        .ok()
        .map(|dt| dt.and_utc())
}

/// Parse a TRIGGER value (-PT30M, PT5M, -P1D) into signed minutes from the start.
fn parse_trigger_offset(value: &str) -> Option<i64> {
    let is_before = value.starts_with('-');
    let duration_str = value.trim_start_matches(['-', '+']);

    let duration = iso8601::duration(duration_str).ok()?;
    let std_duration: std::time::Duration = duration.into();
    let minutes = (std_duration.as_secs() / 60) as i64;

    Some(if is_before { -minutes } else { minutes })
}
