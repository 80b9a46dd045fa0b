//! The canonical schedule entry.
//!
//! The coordinator owns every `Event`; the calendar adapter and the trigger
//! manager only see copies and report identifiers back.

mod format;

pub use format::{format_duration, format_hour};

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_CALENDAR_GLYPH, DEFAULT_MINUTES_BEFORE};
use crate::date_key::DateKey;
use crate::error::{DayDialError, DayDialResult};
use crate::notification::TriggerHandle;

/// Events starting before this hour are drawn after midnight in night mode.
const NIGHT_MODE_WRAP_HOUR: f64 = 6.0;

pub const DEFAULT_COLOR_TAG: &str = "blue";

/// Relationship between a local event and the external calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Never pushed; lives only in the local store.
    #[default]
    Local,
    /// Mirrored by an external record (ids are set).
    SyncedExternal,
    /// Local edit not yet mirrored; retried on the next reconcile.
    PendingPush,
    /// External side changed; the next reconcile takes the external copy.
    PendingPull,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub minutes_before: BTreeSet<u32>,
    /// Handles of the reminders currently scheduled for this event.
    #[serde(default)]
    pub trigger_ids: Vec<TriggerHandle>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        NotificationSettings {
            enabled: true,
            minutes_before: DEFAULT_MINUTES_BEFORE.iter().copied().collect(),
            trigger_ids: Vec::new(),
        }
    }
}

impl NotificationSettings {
    pub fn disabled() -> Self {
        NotificationSettings {
            enabled: false,
            minutes_before: BTreeSet::new(),
            trigger_ids: Vec::new(),
        }
    }

    pub fn with_minutes(minutes: impl IntoIterator<Item = u32>) -> Self {
        let minutes_before: BTreeSet<u32> = minutes.into_iter().collect();
        NotificationSettings {
            enabled: !minutes_before.is_empty(),
            minutes_before,
            trigger_ids: Vec::new(),
        }
    }
}

/// A titled, time-boxed schedule entry with reminder settings.
///
/// Identity is the `id`: two values with the same id are the same event even
/// if one of them carries an in-place edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub emoji: String,
    pub color_tag: String,
    pub date_key: DateKey,
    pub start_hour: f64,
    pub end_hour: f64,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub notification_settings: NotificationSettings,
    #[serde(default)]
    pub sync_state: SyncState,
    pub external_event_id: Option<String>,
    pub external_calendar_id: Option<String>,
    #[serde(default)]
    pub is_from_calendar: bool,
    pub last_modified: DateTime<Utc>,
}

impl Event {
    pub fn new(title: impl Into<String>, date_key: DateKey, start_hour: f64, end_hour: f64) -> Self {
        Event {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            description: None,
            emoji: DEFAULT_CALENDAR_GLYPH.to_string(),
            color_tag: DEFAULT_COLOR_TAG.to_string(),
            date_key,
            start_hour,
            end_hour,
            is_completed: false,
            notification_settings: NotificationSettings::default(),
            sync_state: SyncState::Local,
            external_event_id: None,
            external_calendar_id: None,
            is_from_calendar: false,
            last_modified: Utc::now(),
        }
    }

    pub fn with_emoji(mut self, emoji: impl Into<String>) -> Self {
        self.emoji = emoji.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.description = (!description.is_empty()).then_some(description);
        self
    }

    pub fn with_color(mut self, color_tag: impl Into<String>) -> Self {
        self.color_tag = color_tag.into();
        self
    }

    pub fn with_reminders(mut self, minutes: impl IntoIterator<Item = u32>) -> Self {
        self.notification_settings = NotificationSettings::with_minutes(minutes);
        self
    }

    pub fn duration(&self) -> f64 {
        self.end_hour - self.start_hour
    }

    /// Check the time-box invariants: `0 <= start < end <= 24`.
    pub fn validate(&self) -> DayDialResult<()> {
        if !self.start_hour.is_finite() || !self.end_hour.is_finite() {
            return Err(DayDialError::InvalidEvent(format!(
                "'{}' has a non-numeric time",
                self.title
            )));
        }
        if self.start_hour < 0.0 || self.start_hour >= 24.0 {
            return Err(DayDialError::InvalidEvent(format!(
                "'{}' starts outside the day ({})",
                self.title, self.start_hour
            )));
        }
        if self.end_hour <= self.start_hour || self.end_hour > 24.0 {
            return Err(DayDialError::InvalidEvent(format!(
                "'{}' must end after it starts and by midnight ({} - {})",
                self.title, self.start_hour, self.end_hour
            )));
        }
        if self.sync_state == SyncState::SyncedExternal
            && (self.external_event_id.is_none() || self.external_calendar_id.is_none())
        {
            return Err(DayDialError::InvalidEvent(format!(
                "'{}' is marked synced but has no external record",
                self.title
            )));
        }
        Ok(())
    }

    /// Hours in the virtual `[18, 30)` night-mode range. Rendering only.
    pub fn night_view_hours(&self) -> (f64, f64) {
        if self.start_hour < NIGHT_MODE_WRAP_HOUR {
            (self.start_hour + 24.0, self.end_hour + 24.0)
        } else {
            (self.start_hour, self.end_hour)
        }
    }

    /// Whether an external record is attached.
    pub fn is_linked(&self) -> bool {
        self.external_event_id.is_some()
    }

    pub fn link_external(&mut self, external_event_id: String, external_calendar_id: String) {
        self.external_event_id = Some(external_event_id);
        self.external_calendar_id = Some(external_calendar_id);
        self.sync_state = SyncState::SyncedExternal;
    }

    /// Drop the external link, e.g. after the record vanished outside the app.
    pub fn unlink_external(&mut self) {
        self.external_event_id = None;
        if self.sync_state == SyncState::SyncedExternal || self.sync_state == SyncState::PendingPull {
            self.sync_state = SyncState::Local;
        }
    }

    /// Compare the fields that are mirrored to the external calendar.
    pub fn same_content(&self, other: &Event) -> bool {
        self.title == other.title
            && self.description == other.description
            && self.emoji == other.emoji
            && self.date_key == other.date_key
            && same_hour(self.start_hour, other.start_hour)
            && same_hour(self.end_hour, other.end_hour)
            && self.effective_reminders() == other.effective_reminders()
    }

    /// Reminder offsets that are actually in force.
    pub fn effective_reminders(&self) -> BTreeSet<u32> {
        if self.notification_settings.enabled {
            self.notification_settings.minutes_before.clone()
        } else {
            BTreeSet::new()
        }
    }

    /// `"{emoji} {title}"`, or just the title when there is no emoji.
    pub fn display_title(&self) -> String {
        if self.emoji.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.emoji, self.title)
        }
    }
}

/// Hours are equal when they land on the same second.
fn same_hour(a: f64, b: f64) -> bool {
    ((a - b) * 3600.0).abs() < 0.5
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Event {}

impl Hash for Event {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> DateKey {
        DateKey::parse("2025-03-20").unwrap()
    }

    #[test]
    fn test_identity_is_by_id() {
        let event = Event::new("Standup", day(), 9.0, 9.5);
        let mut edited = event.clone();
        edited.title = "Daily standup".to_string();
        edited.start_hour = 10.0;
        assert_eq!(event, edited);
        assert_ne!(event, Event::new("Standup", day(), 9.0, 9.5));
    }

    #[test]
    fn test_validate_rejects_inverted_hours() {
        assert!(Event::new("ok", day(), 9.0, 9.5).validate().is_ok());
        assert!(Event::new("ok", day(), 23.0, 24.0).validate().is_ok());
        assert!(Event::new("bad", day(), 10.0, 9.0).validate().is_err());
        assert!(Event::new("bad", day(), 9.0, 9.0).validate().is_err());
        assert!(Event::new("bad", day(), -1.0, 2.0).validate().is_err());
        assert!(Event::new("bad", day(), 24.0, 25.0).validate().is_err());
        assert!(Event::new("bad", day(), f64::NAN, 2.0).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_synced_without_ids() {
        let mut event = Event::new("Standup", day(), 9.0, 9.5);
        event.sync_state = SyncState::SyncedExternal;
        assert!(event.validate().is_err());
        event.link_external("ext-1".into(), "work".into());
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_night_view_wraps_early_events() {
        let late = Event::new("Movie", day(), 21.0, 23.0);
        let early = Event::new("Feed baby", day(), 2.0, 2.5);
        assert_eq!(late.night_view_hours(), (21.0, 23.0));
        assert_eq!(early.night_view_hours(), (26.0, 26.5));
    }

    #[test]
    fn test_same_content_ignores_local_only_fields() {
        let event = Event::new("Standup", day(), 9.0, 9.5).with_reminders([15, 5]);
        let mut other = event.clone();
        other.is_completed = true;
        other.color_tag = "red".into();
        assert!(event.same_content(&other));
        other.start_hour = 9.25;
        assert!(!event.same_content(&other));
    }

    #[test]
    fn test_same_content_compares_reminders_in_force() {
        let mut event = Event::new("Standup", day(), 9.0, 9.5).with_reminders([15]);
        let mut other = event.clone();
        other.notification_settings = NotificationSettings::disabled();
        assert!(!event.same_content(&other));

        event.notification_settings.enabled = false;
        assert!(event.same_content(&other));
    }

    #[test]
    fn test_serde_round_trip_keeps_sync_state() {
        let mut event = Event::new("Standup", day(), 9.0, 9.5);
        event.link_external("ext-1".into(), "work".into());
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"synced_external\""));
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sync_state, SyncState::SyncedExternal);
        assert_eq!(back.external_event_id.as_deref(), Some("ext-1"));
    }
}
