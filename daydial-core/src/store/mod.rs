//! Local event storage.
//!
//! Events are partitioned by `DateKey`. Access is synchronous and only the
//! sync coordinator touches a store.

mod json_dir;
mod memory;

pub use json_dir::JsonDirStore;
pub use memory::MemoryStore;

use crate::date_key::DateKey;
use crate::date_range::DateRange;
use crate::error::DayDialResult;
use crate::event::Event;

pub trait LocalStore: Send {
    /// Events of one day, ordered by start hour.
    fn events_on(&self, date_key: DateKey) -> DayDialResult<Vec<Event>>;

    fn event(&self, id: &str) -> DayDialResult<Option<Event>>;

    /// Events of every day in `range`.
    fn events_in(&self, range: &DateRange) -> DayDialResult<Vec<Event>> {
        let mut events = Vec::new();
        for day in range.days() {
            events.extend(self.events_on(day)?);
        }
        Ok(events)
    }

    /// Every stored event, ordered by day.
    fn all_events(&self) -> DayDialResult<Vec<Event>>;

    /// The local event linked to an external record, on any day.
    fn linked_to(&self, external_event_id: &str) -> DayDialResult<Option<Event>>;

    /// Insert or replace by id. An event whose `date_key` changed moves to
    /// its new day.
    fn put(&mut self, event: &Event) -> DayDialResult<()>;

    /// Returns the removed event.
    fn remove(&mut self, id: &str) -> DayDialResult<Option<Event>>;
}

pub(crate) fn sort_by_start(events: &mut [Event]) {
    events.sort_by(|a, b| {
        a.start_hour
            .total_cmp(&b.start_hour)
            .then_with(|| a.end_hour.total_cmp(&b.end_hour))
            .then_with(|| a.id.cmp(&b.id))
    });
}
