//! In-memory calendar store for tests and embedding.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::calendar::{AuthorizationStatus, CalendarSource, CalendarStore, ExternalRecord};
use crate::clock::{Clock, SystemClock};
use crate::error::{DayDialError, DayDialResult};

struct Inner {
    authorization: AuthorizationStatus,
    /// Status `request_access` moves to from `NotDetermined`.
    grant: AuthorizationStatus,
    prompts: usize,
    calendars: Vec<CalendarSource>,
    records: BTreeMap<String, ExternalRecord>,
    next_id: u64,
}

impl Inner {
    fn check_writable(&self, calendar_id: &str) -> DayDialResult<()> {
        match self.calendars.iter().find(|c| c.id == calendar_id) {
            Some(calendar) if calendar.writable => Ok(()),
            _ => Err(DayDialError::SourceNotFound(calendar_id.to_string())),
        }
    }
}

/// Calendar store that keeps everything in memory.
///
/// `insert_external`, `edit_external` and `remove_external` simulate edits
/// made outside the app and fire the change signal.
pub struct MemoryCalendarStore {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
    create_latency: Mutex<Duration>,
    query_latency: Mutex<Duration>,
    changes: broadcast::Sender<()>,
    clock: Arc<dyn Clock>,
}

impl MemoryCalendarStore {
    pub fn new(authorization: AuthorizationStatus) -> Self {
        let (changes, _) = broadcast::channel(16);
        MemoryCalendarStore {
            inner: Mutex::new(Inner {
                authorization,
                grant: AuthorizationStatus::FullAccess,
                prompts: 0,
                calendars: Vec::new(),
                records: BTreeMap::new(),
                next_id: 1,
            }),
            unavailable: AtomicBool::new(false),
            create_latency: Mutex::new(Duration::ZERO),
            query_latency: Mutex::new(Duration::ZERO),
            changes,
            clock: Arc::new(SystemClock),
        }
    }

    /// Stamp `last_modified` from `clock` instead of the system time.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// A store with full access and one writable calendar per id.
    pub fn with_calendars(ids: &[&str]) -> Self {
        let store = Self::new(AuthorizationStatus::FullAccess);
        for id in ids {
            store.add_calendar(CalendarSource {
                id: id.to_string(),
                display_name: id.to_string(),
                color_tag: "blue".to_string(),
                writable: true,
            });
        }
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_calendar(&self, source: CalendarSource) {
        let mut inner = self.lock();
        inner.calendars.retain(|c| c.id != source.id);
        inner.calendars.push(source);
    }

    pub fn set_authorization(&self, status: AuthorizationStatus) {
        self.lock().authorization = status;
    }

    /// What the user answers when prompted.
    pub fn answer_prompt_with(&self, status: AuthorizationStatus) {
        self.lock().grant = status;
    }

    /// How many times the access prompt was shown.
    pub fn prompt_count(&self) -> usize {
        self.lock().prompts
    }

    /// Make every call fail with `TransientIo` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay `create` after the record is stored, before its id is returned.
    pub fn set_create_latency(&self, latency: Duration) {
        *self.create_latency.lock().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    /// Delay every `events` query before it reads the records.
    pub fn set_query_latency(&self, latency: Duration) {
        *self.query_latency.lock().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    async fn wait(latency: &Mutex<Duration>) {
        let latency = *latency.lock().unwrap_or_else(|e| e.into_inner());
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    pub fn record(&self, id: &str) -> Option<ExternalRecord> {
        self.lock().records.get(id).cloned()
    }

    pub fn records(&self) -> Vec<ExternalRecord> {
        self.lock().records.values().cloned().collect()
    }

    /// Add a record as if another app created it. Returns the assigned id.
    pub fn insert_external(&self, mut record: ExternalRecord) -> String {
        let id = {
            let mut inner = self.lock();
            if record.id.is_empty() {
                record.id = format!("ext-{}", inner.next_id);
                inner.next_id += 1;
            }
            let id = record.id.clone();
            inner.records.insert(id.clone(), record);
            id
        };
        self.notify_change();
        id
    }

    /// Change a record as if another app edited it. Stamps `last_modified`.
    pub fn edit_external(&self, id: &str, edit: impl FnOnce(&mut ExternalRecord)) -> bool {
        let now = self.clock.now();
        let found = {
            let mut inner = self.lock();
            match inner.records.get_mut(id) {
                Some(record) => {
                    edit(record);
                    record.last_modified = now;
                    true
                }
                None => false,
            }
        };
        if found {
            self.notify_change();
        }
        found
    }

    /// Remove a record as if another app deleted it.
    pub fn remove_external(&self, id: &str) -> bool {
        let removed = self.lock().records.remove(id).is_some();
        if removed {
            self.notify_change();
        }
        removed
    }

    pub fn notify_change(&self) {
        // No receivers is fine.
        let _ = self.changes.send(());
    }

    fn check_available(&self) -> DayDialResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DayDialError::TransientIo("calendar store offline".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryCalendarStore {
    fn default() -> Self {
        Self::new(AuthorizationStatus::NotDetermined)
    }
}

#[async_trait]
impl CalendarStore for MemoryCalendarStore {
    async fn authorization(&self) -> AuthorizationStatus {
        self.lock().authorization
    }

    async fn request_access(&self) -> DayDialResult<bool> {
        let mut inner = self.lock();
        if inner.authorization == AuthorizationStatus::NotDetermined {
            inner.prompts += 1;
            inner.authorization = inner.grant;
        }
        Ok(inner.authorization.can_write())
    }

    async fn calendars(&self) -> DayDialResult<Vec<CalendarSource>> {
        self.check_available()?;
        Ok(self.lock().calendars.clone())
    }

    async fn events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        calendar_ids: &[String],
    ) -> DayDialResult<Vec<ExternalRecord>> {
        self.check_available()?;
        Self::wait(&self.query_latency).await;
        Ok(self
            .lock()
            .records
            .values()
            .filter(|r| calendar_ids.contains(&r.calendar_id))
            .filter(|r| r.start < end && (r.end > start || r.start >= start))
            .cloned()
            .collect())
    }

    async fn event(&self, id: &str) -> DayDialResult<Option<ExternalRecord>> {
        self.check_available()?;
        Ok(self.record(id))
    }

    async fn create(&self, mut record: ExternalRecord) -> DayDialResult<ExternalRecord> {
        self.check_available()?;
        let now = self.clock.now();
        {
            let mut inner = self.lock();
            inner.check_writable(&record.calendar_id)?;
            record.id = format!("ext-{}", inner.next_id);
            inner.next_id += 1;
            record.last_modified = now;
            inner.records.insert(record.id.clone(), record.clone());
        }

        Self::wait(&self.create_latency).await;
        Ok(record)
    }

    async fn update(&self, mut record: ExternalRecord) -> DayDialResult<ExternalRecord> {
        self.check_available()?;
        let now = self.clock.now();
        let mut inner = self.lock();
        if !inner.records.contains_key(&record.id) {
            return Err(DayDialError::ExternalRecordNotFound(record.id));
        }
        inner.check_writable(&record.calendar_id)?;
        record.last_modified = now;
        inner.records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn remove(&self, id: &str) -> DayDialResult<bool> {
        self.check_available()?;
        let mut inner = self.lock();
        let Some(calendar_id) = inner.records.get(id).map(|r| r.calendar_id.clone()) else {
            return Ok(false);
        };
        inner.check_writable(&calendar_id)?;
        Ok(inner.records.remove(id).is_some())
    }

    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }
}
