//! Task records produced by the AI import service.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::date_key::DateKey;
use crate::error::{DayDialError, DayDialResult};
use crate::event::{Event, NotificationSettings};

/// One task as the import service returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// `HH:MM`, 24-hour.
    pub start_time: String,
    /// `HH:MM`, 24-hour. `24:00` or `00:00` mean midnight at the end of the day.
    pub end_time: String,
    pub date_key: DateKey,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub color_tag: Option<String>,
}

impl ImportedTask {
    /// A local, unlinked event for this task.
    pub fn to_event(&self, default_reminders: &BTreeSet<u32>) -> DayDialResult<Event> {
        let start_hour = parse_clock(&self.start_time)?;
        let end_hour = match parse_clock(&self.end_time)? {
            end if end == 0.0 && start_hour > 0.0 => 24.0,
            end => end,
        };

        let mut event = Event::new(self.title.trim(), self.date_key, start_hour, end_hour);
        if let Some(emoji) = self.emoji.as_deref().filter(|e| !e.trim().is_empty()) {
            event = event.with_emoji(emoji.trim());
        }
        if let Some(description) = &self.description {
            event = event.with_description(description.trim());
        }
        if let Some(color_tag) = self.color_tag.as_deref().filter(|c| !c.is_empty()) {
            event = event.with_color(color_tag);
        }
        event.notification_settings = NotificationSettings::with_minutes(default_reminders.iter().copied());

        event.validate()?;
        Ok(event)
    }
}

/// Parse a `HH:MM` clock reading into fractional hours.
pub fn parse_clock(value: &str) -> DayDialResult<f64> {
    let invalid = || DayDialError::InvalidEvent(format!("Invalid time '{value}'. Expected HH:MM"));

    let (hours, minutes) = value.trim().split_once(':').ok_or_else(invalid)?;
    let hours: u32 = hours.parse().map_err(|_| invalid())?;
    let minutes: u32 = minutes.parse().map_err(|_| invalid())?;

    if minutes >= 60 || hours > 24 || (hours == 24 && minutes > 0) {
        return Err(invalid());
    }
    Ok(f64::from(hours) + f64::from(minutes) / 60.0)
}
