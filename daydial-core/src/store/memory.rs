use std::collections::{BTreeMap, HashMap};

use crate::date_key::DateKey;
use crate::error::DayDialResult;
use crate::event::Event;
use crate::store::{LocalStore, sort_by_start};

/// Local store that keeps events in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    days: BTreeMap<DateKey, Vec<Event>>,
    index: HashMap<String, DateKey>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl LocalStore for MemoryStore {
    fn events_on(&self, date_key: DateKey) -> DayDialResult<Vec<Event>> {
        Ok(self.days.get(&date_key).cloned().unwrap_or_default())
    }

    fn event(&self, id: &str) -> DayDialResult<Option<Event>> {
        let Some(day) = self.index.get(id) else {
            return Ok(None);
        };
        Ok(self
            .days
            .get(day)
            .and_then(|events| events.iter().find(|e| e.id == id))
            .cloned())
    }

    fn all_events(&self) -> DayDialResult<Vec<Event>> {
        Ok(self.days.values().flatten().cloned().collect())
    }

    fn linked_to(&self, external_event_id: &str) -> DayDialResult<Option<Event>> {
        Ok(self
            .days
            .values()
            .flatten()
            .find(|e| e.external_event_id.as_deref() == Some(external_event_id))
            .cloned())
    }

    fn put(&mut self, event: &Event) -> DayDialResult<()> {
        self.remove(&event.id)?;
        let day = self.days.entry(event.date_key).or_default();
        day.push(event.clone());
        sort_by_start(day);
        self.index.insert(event.id.clone(), event.date_key);
        Ok(())
    }

    fn remove(&mut self, id: &str) -> DayDialResult<Option<Event>> {
        let Some(day) = self.index.remove(id) else {
            return Ok(None);
        };
        let Some(events) = self.days.get_mut(&day) else {
            return Ok(None);
        };
        let removed = events
            .iter()
            .position(|e| e.id == id)
            .map(|pos| events.remove(pos));
        if events.is_empty() {
            self.days.remove(&day);
        }
        Ok(removed)
    }
}
