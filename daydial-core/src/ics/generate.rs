//! ICS generation for external calendar records.

use icalendar::{Alarm, Calendar, Component, EventLike, Trigger};

use crate::calendar::ExternalRecord;

const ICS_UTC_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Generate .ics content for a single external record.
pub fn generate_ics(record: &ExternalRecord) -> String {
    let mut cal = Calendar::new();

    let mut ics_event = icalendar::Event::new();
    ics_event.uid(&record.id);
    ics_event.summary(&record.title);

    let stamp = record.last_modified.format(ICS_UTC_FORMAT).to_string();
    ics_event.add_property("DTSTAMP", &stamp);
    ics_event.add_property("LAST-MODIFIED", &stamp);

    ics_event.add_property("DTSTART", record.start.format(ICS_UTC_FORMAT).to_string());
    ics_event.add_property("DTEND", record.end.format(ICS_UTC_FORMAT).to_string());

    if let Some(ref notes) = record.notes {
        ics_event.description(notes);
    }

    // Offsets are signed minutes relative to the start; negative means before.
    for offset in &record.alarms {
        let trigger = Trigger::before_start(chrono::Duration::minutes(-offset));
        ics_event.alarm(Alarm::display("Reminder", trigger));
    }

    let ics_event = ics_event.done();
    cal.push(ics_event);
    let cal = cal.done();

    strip_ics_bloat(&cal.to_string())
}

/// Drop what the icalendar crate adds but nobody reads:
/// its PRODID, `CALSCALE:GREGORIAN`, and DTSTAMP/UID inside VALARM.
fn strip_ics_bloat(ics: &str) -> String {
    let mut result = String::with_capacity(ics.len());
    let mut in_valarm = false;

    for line in ics.lines() {
        if line.starts_with("PRODID:") {
            result.push_str("PRODID:DAYDIAL\r\n");
            continue;
        }

        if line == "CALSCALE:GREGORIAN" {
            continue;
        }

        if line == "BEGIN:VALARM" {
            in_valarm = true;
        } else if line == "END:VALARM" {
            in_valarm = false;
        }

        if in_valarm && (line.starts_with("DTSTAMP:") || line.starts_with("UID:")) {
            continue;
        }

        result.push_str(line);
        result.push_str("\r\n");
    }

    result
}
