//! Authorization, source selection and record translation on top of a
//! `CalendarStore`.

use std::sync::{Arc, RwLock};

use chrono_tz::Tz;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::calendar::convert::{from_record, to_record};
use crate::calendar::{AuthorizationStatus, CalendarSource, CalendarStore, ExternalRecord};
use crate::date_range::DateRange;
use crate::error::{DayDialError, DayDialResult, Permission};
use crate::event::Event;

pub struct CalendarAdapter {
    store: Arc<dyn CalendarStore>,
    tz: Tz,
    sources: RwLock<Vec<CalendarSource>>,
}

impl CalendarAdapter {
    pub fn new(store: Arc<dyn CalendarStore>, tz: Tz) -> Self {
        CalendarAdapter {
            store,
            tz,
            sources: RwLock::new(Vec::new()),
        }
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub async fn authorization(&self) -> AuthorizationStatus {
        self.store.authorization().await
    }

    /// Ask for calendar access and load the calendar list on success.
    ///
    /// The prompt is shown at most once: after a denial this returns false
    /// without asking again.
    pub async fn request_access(&self) -> DayDialResult<bool> {
        let granted = match self.store.authorization().await {
            AuthorizationStatus::NotDetermined => self.store.request_access().await?,
            AuthorizationStatus::Denied | AuthorizationStatus::Restricted => false,
            AuthorizationStatus::FullAccess | AuthorizationStatus::WriteOnly => true,
        };

        if granted {
            let sources = self.refresh_sources().await?;
            info!(count = sources.len(), "calendar access granted");
        } else {
            info!("calendar access denied");
        }
        Ok(granted)
    }

    /// Every calendar, for picking import sources.
    pub async fn all_sources(&self) -> DayDialResult<Vec<CalendarSource>> {
        self.refresh_sources().await
    }

    /// Calendars that can be the target of two-way sync.
    pub async fn list_sources(&self) -> DayDialResult<Vec<CalendarSource>> {
        Ok(self
            .refresh_sources()
            .await?
            .into_iter()
            .filter(|s| s.writable)
            .collect())
    }

    async fn refresh_sources(&self) -> DayDialResult<Vec<CalendarSource>> {
        let status = self.store.authorization().await;
        if !status.can_read() && !status.can_write() {
            return Err(DayDialError::NotAuthorized(Permission::Calendar));
        }

        let sources = self.store.calendars().await?;
        *self.sources.write().unwrap_or_else(|e| e.into_inner()) = sources.clone();
        Ok(sources)
    }

    fn cached_source(&self, id: &str) -> Option<CalendarSource> {
        self.sources
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    /// External records of `source_ids` that overlap `range`.
    pub async fn fetch_external_events(
        &self,
        range: &DateRange,
        source_ids: &[String],
    ) -> DayDialResult<Vec<ExternalRecord>> {
        if source_ids.is_empty() {
            return Ok(Vec::new());
        }
        if !self.store.authorization().await.can_read() {
            return Err(DayDialError::NotAuthorized(Permission::Calendar));
        }

        let (start, end) = range.utc_window(self.tz);
        let records = self.store.events(start, end, source_ids).await?;
        debug!(from = %range.from, to = %range.to, count = records.len(), "fetched external events");
        Ok(records)
    }

    /// One external record by id, or `None` when it was deleted.
    pub async fn fetch_record(&self, external_event_id: &str) -> DayDialResult<Option<ExternalRecord>> {
        if !self.store.authorization().await.can_read() {
            return Err(DayDialError::NotAuthorized(Permission::Calendar));
        }
        self.store.event(external_event_id).await
    }

    /// Create or update the external record mirroring `event`.
    ///
    /// Linked events update their record in place; a record deleted outside
    /// the app fails with `ExternalRecordNotFound` so the caller can unlink
    /// and push again. Unlinked events are created in `target`.
    pub async fn push(&self, event: &Event, target: &str) -> DayDialResult<ExternalRecord> {
        if !self.store.authorization().await.can_write() {
            return Err(DayDialError::NotAuthorized(Permission::Calendar));
        }

        let calendar_id = match (&event.external_event_id, &event.external_calendar_id) {
            (Some(_), Some(calendar_id)) => calendar_id.as_str(),
            _ => target,
        };

        let calendars = self.store.calendars().await?;
        match calendars.iter().find(|c| c.id == calendar_id) {
            Some(source) if source.writable => {}
            _ => return Err(DayDialError::SourceNotFound(calendar_id.to_string())),
        }

        let record = to_record(event, calendar_id, self.tz);
        let saved = if event.external_event_id.is_some() {
            self.store.update(record).await?
        } else {
            self.store.create(record).await?
        };

        debug!(event_id = %event.id, external_id = %saved.id, calendar = %saved.calendar_id, "pushed event");
        Ok(saved)
    }

    /// Delete an external record. Deleting a record that is already gone
    /// succeeds.
    pub async fn delete(&self, external_event_id: &str) -> DayDialResult<()> {
        if !self.store.authorization().await.can_write() {
            return Err(DayDialError::NotAuthorized(Permission::Calendar));
        }

        if !self.store.remove(external_event_id).await? {
            warn!(external_id = %external_event_id, "external record was already gone");
        }
        Ok(())
    }

    /// Local event for an external record, colored like its calendar.
    pub fn convert(&self, record: &ExternalRecord) -> Event {
        let mut event = from_record(record, self.tz);
        if let Some(source) = self.cached_source(&record.calendar_id) {
            event.color_tag = source.color_tag;
        }
        event
    }

    /// Fires whenever the external store reports a change.
    pub fn changes(&self) -> broadcast::Receiver<()> {
        self.store.subscribe()
    }
}
