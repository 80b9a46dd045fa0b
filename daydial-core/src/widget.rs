//! Read-only day snapshots for home screen widgets.
//!
//! A snapshot is rewritten whenever the bus reports a change for its day, so
//! a widget never has to open the event store itself.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::date_key::DateKey;
use crate::error::DayDialResult;
use crate::event::Event;
use crate::utils::write_atomic;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetEntry {
    pub id: String,
    pub title: String,
    pub emoji: String,
    pub color_tag: String,
    pub start_hour: f64,
    pub end_hour: f64,
    /// e.g. `9:00 AM - 9:30 AM`
    pub time_range: String,
    pub is_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetSnapshot {
    pub date_key: DateKey,
    pub generated_at: DateTime<Utc>,
    pub events: Vec<WidgetEntry>,
}

impl WidgetSnapshot {
    /// Snapshot of one day. `events` are expected in display order.
    pub fn of_day(date_key: DateKey, events: &[Event], generated_at: DateTime<Utc>) -> Self {
        let events = events
            .iter()
            .filter(|e| e.date_key == date_key)
            .map(|e| WidgetEntry {
                id: e.id.clone(),
                title: e.title.clone(),
                emoji: e.emoji.clone(),
                color_tag: e.color_tag.clone(),
                start_hour: e.start_hour,
                end_hour: e.end_hour,
                time_range: e.time_range_string(),
                is_completed: e.is_completed,
            })
            .collect();

        WidgetSnapshot {
            date_key,
            generated_at,
            events,
        }
    }

    /// The next event that is not completed and has not ended by `hour`.
    pub fn up_next(&self, hour: f64) -> Option<&WidgetEntry> {
        self.events.iter().find(|e| !e.is_completed && e.end_hour > hour)
    }
}

/// Writes snapshots to `<dir>/<dateKey>.json`.
#[derive(Debug, Clone)]
pub struct WidgetExporter {
    dir: PathBuf,
}

impl WidgetExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        WidgetExporter { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, date_key: DateKey) -> PathBuf {
        self.dir.join(format!("{date_key}.json"))
    }

    pub fn write(&self, snapshot: &WidgetSnapshot) -> DayDialResult<PathBuf> {
        let path = self.path_for(snapshot.date_key);
        write_atomic(&path, &serde_json::to_string_pretty(snapshot)?)?;
        Ok(path)
    }

    pub fn read(&self, date_key: DateKey) -> DayDialResult<Option<WidgetSnapshot>> {
        let path = self.path_for(date_key);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> DateKey {
        DateKey::parse(s).unwrap()
    }

    #[test]
    fn test_snapshot_keeps_only_its_day() {
        let day = key("2025-03-20");
        let events = vec![
            Event::new("Standup", day, 9.0, 9.5).with_emoji("☕"),
            Event::new("Tomorrow", key("2025-03-21"), 9.0, 10.0),
        ];
        let snapshot = WidgetSnapshot::of_day(day, &events, Utc::now());

        assert_eq!(snapshot.events.len(), 1);
        assert_eq!(snapshot.events[0].title, "Standup");
        assert_eq!(snapshot.events[0].emoji, "☕");
        assert_eq!(snapshot.events[0].time_range, events[0].time_range_string());
    }

    #[test]
    fn test_up_next_skips_done_and_past() {
        let day = key("2025-03-20");
        let mut done = Event::new("Gym", day, 7.0, 8.0);
        done.is_completed = true;
        let events = vec![done, Event::new("Standup", day, 9.0, 9.5), Event::new("Lunch", day, 12.0, 13.0)];
        let snapshot = WidgetSnapshot::of_day(day, &events, Utc::now());

        assert_eq!(snapshot.up_next(6.0).unwrap().title, "Standup");
        assert_eq!(snapshot.up_next(10.0).unwrap().title, "Lunch");
        assert!(snapshot.up_next(13.0).is_none());
    }

    #[test]
    fn test_exporter_writes_one_file_per_day() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = WidgetExporter::new(dir.path().join("widget"));
        let day = key("2025-03-20");

        assert!(exporter.read(day).unwrap().is_none());

        let snapshot = WidgetSnapshot::of_day(day, &[Event::new("Standup", day, 9.0, 9.5)], Utc::now());
        let path = exporter.write(&snapshot).unwrap();

        assert_eq!(path, dir.path().join("widget/2025-03-20.json"));
        assert_eq!(exporter.read(day).unwrap().unwrap(), snapshot);
    }
}
