//! Local store with one JSON document per day: `<dir>/<YYYY-MM-DD>.json`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::date_key::DateKey;
use crate::error::DayDialResult;
use crate::event::Event;
use crate::store::{LocalStore, sort_by_start};
use crate::utils::write_atomic;

pub struct JsonDirStore {
    dir: PathBuf,
    /// Which day file holds each event id.
    index: HashMap<String, DateKey>,
}

impl JsonDirStore {
    /// Open (or create) a store in `dir` and index the existing day files.
    pub fn open(dir: impl Into<PathBuf>) -> DayDialResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let mut store = JsonDirStore {
            dir,
            index: HashMap::new(),
        };
        store.rebuild_index()?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn day_path(&self, date_key: DateKey) -> PathBuf {
        self.dir.join(format!("{date_key}.json"))
    }

    fn stored_days(&self) -> DayDialResult<Vec<DateKey>> {
        let mut days: Vec<DateKey> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|e| e == "json"))
            .filter_map(|path| DateKey::parse(path.file_stem()?.to_str()?).ok())
            .collect();
        days.sort();
        Ok(days)
    }

    fn rebuild_index(&mut self) -> DayDialResult<()> {
        let mut newest: HashMap<String, (DateKey, Event)> = HashMap::new();

        for day in self.stored_days()? {
            for event in self.read_day(day)? {
                match newest.get(&event.id) {
                    // A crash mid-move can leave an event in two files.
                    Some((_, seen)) if seen.last_modified >= event.last_modified => {
                        warn!(event_id = %event.id, date_key = %day, "ignoring stale duplicate event");
                    }
                    _ => {
                        newest.insert(event.id.clone(), (day, event));
                    }
                }
            }
        }

        self.index = newest.into_iter().map(|(id, (day, _))| (id, day)).collect();
        Ok(())
    }

    fn read_day(&self, date_key: DateKey) -> DayDialResult<Vec<Event>> {
        let path = self.day_path(date_key);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write_day(&self, date_key: DateKey, events: &[Event]) -> DayDialResult<()> {
        let path = self.day_path(date_key);
        if events.is_empty() {
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
            return Ok(());
        }
        write_atomic(&path, &serde_json::to_string_pretty(events)?)
    }
}

impl LocalStore for JsonDirStore {
    fn events_on(&self, date_key: DateKey) -> DayDialResult<Vec<Event>> {
        let mut events: Vec<Event> = self
            .read_day(date_key)?
            .into_iter()
            .filter(|e| self.index.get(&e.id) == Some(&date_key))
            .collect();
        sort_by_start(&mut events);
        Ok(events)
    }

    fn event(&self, id: &str) -> DayDialResult<Option<Event>> {
        let Some(&day) = self.index.get(id) else {
            return Ok(None);
        };
        Ok(self.read_day(day)?.into_iter().find(|e| e.id == id))
    }

    fn all_events(&self) -> DayDialResult<Vec<Event>> {
        let mut events = Vec::new();
        for day in self.stored_days()? {
            events.extend(self.events_on(day)?);
        }
        Ok(events)
    }

    fn linked_to(&self, external_event_id: &str) -> DayDialResult<Option<Event>> {
        Ok(self
            .all_events()?
            .into_iter()
            .find(|e| e.external_event_id.as_deref() == Some(external_event_id)))
    }

    fn put(&mut self, event: &Event) -> DayDialResult<()> {
        let mut day = self.read_day(event.date_key)?;
        day.retain(|e| e.id != event.id);
        day.push(event.clone());
        sort_by_start(&mut day);
        self.write_day(event.date_key, &day)?;

        // Written to the new day first, so a crash never loses the event.
        match self.index.insert(event.id.clone(), event.date_key) {
            Some(old_day) if old_day != event.date_key => {
                let mut old = self.read_day(old_day)?;
                old.retain(|e| e.id != event.id);
                self.write_day(old_day, &old)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn remove(&mut self, id: &str) -> DayDialResult<Option<Event>> {
        let Some(day) = self.index.remove(id) else {
            return Ok(None);
        };
        let mut events = self.read_day(day)?;
        let removed = events
            .iter()
            .position(|e| e.id == id)
            .map(|pos| events.remove(pos));
        self.write_day(day, &events)?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> DateKey {
        DateKey::parse(s).unwrap()
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let event = Event::new("Standup", key("2025-03-20"), 9.0, 9.5).with_reminders([15, 5]);
        {
            let mut store = JsonDirStore::open(dir.path()).unwrap();
            store.put(&event).unwrap();
        }
        assert!(dir.path().join("2025-03-20.json").exists());

        let store = JsonDirStore::open(dir.path()).unwrap();
        let loaded = store.event(&event.id).unwrap().unwrap();
        assert_eq!(loaded.title, "Standup");
        assert_eq!(loaded.notification_settings.minutes_before.len(), 2);
    }

    #[test]
    fn test_moving_day_rewrites_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonDirStore::open(dir.path()).unwrap();
        let mut event = Event::new("Standup", key("2025-03-20"), 9.0, 9.5);
        store.put(&event).unwrap();

        event.date_key = key("2025-03-21");
        store.put(&event).unwrap();

        assert!(!dir.path().join("2025-03-20.json").exists());
        assert_eq!(store.events_on(key("2025-03-21")).unwrap().len(), 1);
        assert!(store.events_on(key("2025-03-20")).unwrap().is_empty());
    }

    #[test]
    fn test_stale_duplicate_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let old = Event::new("Standup", key("2025-03-20"), 9.0, 9.5);
        let mut moved = old.clone();
        moved.date_key = key("2025-03-21");
        moved.last_modified = old.last_modified + chrono::Duration::minutes(1);

        std::fs::write(dir.path().join("2025-03-20.json"), serde_json::to_string(&vec![&old]).unwrap()).unwrap();
        std::fs::write(dir.path().join("2025-03-21.json"), serde_json::to_string(&vec![&moved]).unwrap()).unwrap();

        let store = JsonDirStore::open(dir.path()).unwrap();
        assert_eq!(store.event(&old.id).unwrap().unwrap().date_key, key("2025-03-21"));
        assert!(store.events_on(key("2025-03-20")).unwrap().is_empty());
    }

    #[test]
    fn test_remove_deletes_empty_day_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonDirStore::open(dir.path()).unwrap();
        let event = Event::new("Standup", key("2025-03-20"), 9.0, 9.5);
        store.put(&event).unwrap();
        assert!(store.remove(&event.id).unwrap().is_some());
        assert!(!dir.path().join("2025-03-20.json").exists());
        assert!(store.remove(&event.id).unwrap().is_none());
    }
}
