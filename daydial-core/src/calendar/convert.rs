//! Translation between local events and external calendar records.

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use unicode_segmentation::UnicodeSegmentation;

use crate::calendar::ExternalRecord;
use crate::constants::DEFAULT_CALENDAR_GLYPH;
use crate::date_key::DateKey;
use crate::event::{Event, NotificationSettings};

/// Zero-length external events are shown as a quarter hour.
const MIN_EVENT_HOURS: f64 = 0.25;

/// Build the external record for `event` in `calendar_id`.
///
/// `id` is empty for records that do not exist externally yet; the store
/// assigns it on create.
pub fn to_record(event: &Event, calendar_id: &str, tz: Tz) -> ExternalRecord {
    let alarms = if event.notification_settings.enabled {
        event
            .notification_settings
            .minutes_before
            .iter()
            .map(|&m| -i64::from(m))
            .collect()
    } else {
        Vec::new()
    };

    ExternalRecord {
        id: event.external_event_id.clone().unwrap_or_default(),
        calendar_id: calendar_id.to_string(),
        title: event.display_title(),
        notes: event.description.clone(),
        start: event.date_key.instant_at(event.start_hour, tz),
        end: event.date_key.instant_at(event.end_hour, tz),
        alarms,
        last_modified: event.last_modified,
    }
}

/// Build a local event from an external record.
///
/// The event gets a fresh id; callers merging into an existing event keep
/// the local id themselves.
pub fn from_record(record: &ExternalRecord, tz: Tz) -> Event {
    let date_key = DateKey::of_instant(record.start, tz);
    let start_hour = local_hours(record.start, tz);

    let end_hour = if DateKey::of_instant(record.end, tz) > date_key {
        24.0
    } else {
        local_hours(record.end, tz)
    };
    let end_hour = if end_hour <= start_hour {
        (start_hour + MIN_EVENT_HOURS).min(24.0)
    } else {
        end_hour
    };

    let (emoji, title) = split_leading_emoji(&record.title);

    // Alarms after the start have no local equivalent.
    let minutes_before = record
        .alarms
        .iter()
        .filter(|&&offset| offset <= 0)
        .filter_map(|&offset| u32::try_from(-offset).ok());

    let mut event = Event::new(title, date_key, start_hour, end_hour)
        .with_emoji(emoji.unwrap_or_else(|| DEFAULT_CALENDAR_GLYPH.to_string()));
    event.description = record.notes.clone().filter(|n| !n.is_empty());
    event.notification_settings = NotificationSettings::with_minutes(minutes_before);
    event.link_external(record.id.clone(), record.calendar_id.clone());
    event.is_from_calendar = true;
    event.last_modified = record.last_modified;
    event
}

/// Wall-clock hours since local midnight.
fn local_hours(instant: DateTime<Utc>, tz: Tz) -> f64 {
    let local = instant.with_timezone(&tz).naive_local();
    let elapsed = local - local.date().and_time(NaiveTime::MIN);
    elapsed.num_seconds() as f64 / 3600.0
}

/// Split a leading emoji off `title`.
pub fn split_leading_emoji(title: &str) -> (Option<String>, String) {
    let trimmed = title.trim_start();
    let Some(first) = trimmed.graphemes(true).next() else {
        return (None, String::new());
    };

    if first.chars().next().is_some_and(is_emoji) {
        let rest = trimmed[first.len()..].trim_start().to_string();
        (Some(first.to_string()), rest)
    } else {
        (None, trimmed.to_string())
    }
}

fn is_emoji(c: char) -> bool {
    matches!(
        c as u32,
        0x1F000..=0x1FAFF
            | 0x2600..=0x27BF
            | 0x2300..=0x23FF
            | 0x2B00..=0x2BFF
            | 0x3030
            | 0x303D
            | 0x3297
            | 0x3299
    )
}
