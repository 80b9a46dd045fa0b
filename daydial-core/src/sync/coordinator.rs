//! Owns the local events and keeps reminders and the external calendar in
//! step with every change.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use chrono_tz::Tz;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, instrument, warn};

use crate::bus::ScheduleBus;
use crate::calendar::CalendarAdapter;
use crate::clock::Clock;
use crate::constants::DEFAULT_MINUTES_BEFORE;
use crate::date_key::DateKey;
use crate::date_range::DateRange;
use crate::diff::{DiffKind, EventDiff, ReconcilePlan};
use crate::error::{DayDialError, DayDialResult};
use crate::event::{Event, SyncState};
use crate::import::ImportedTask;
use crate::notification::TriggerManager;
use crate::store::LocalStore;
use crate::sync::locks::{EventLocks, ReconcileGate};
use crate::sync::{ReconcileReport, SyncSettings};

pub struct SyncCoordinator {
    store: Mutex<Box<dyn LocalStore>>,
    adapter: Arc<CalendarAdapter>,
    triggers: Arc<TriggerManager>,
    settings: RwLock<SyncSettings>,
    default_reminders: BTreeSet<u32>,
    bus: ScheduleBus,
    clock: Arc<dyn Clock>,
    tz: Tz,
    locks: EventLocks,
    gate: ReconcileGate,
    /// Shared by pushes until their link is stored; exclusive while a
    /// reconcile imports a record no local event links to yet.
    links: tokio::sync::RwLock<()>,
}

impl SyncCoordinator {
    pub fn new(
        store: Box<dyn LocalStore>,
        adapter: Arc<CalendarAdapter>,
        triggers: Arc<TriggerManager>,
        settings: SyncSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let tz = adapter.tz();
        SyncCoordinator {
            store: Mutex::new(store),
            adapter,
            triggers,
            settings: RwLock::new(settings),
            default_reminders: DEFAULT_MINUTES_BEFORE.iter().copied().collect(),
            bus: ScheduleBus::new(),
            clock,
            tz,
            locks: EventLocks::default(),
            gate: ReconcileGate::default(),
            links: tokio::sync::RwLock::new(()),
        }
    }

    /// Reminder offsets given to imported tasks.
    pub fn with_default_reminders(mut self, minutes: impl IntoIterator<Item = u32>) -> Self {
        self.default_reminders = minutes.into_iter().collect();
        self
    }

    pub fn bus(&self) -> &ScheduleBus {
        &self.bus
    }

    pub fn adapter(&self) -> &CalendarAdapter {
        &self.adapter
    }

    pub fn triggers(&self) -> &TriggerManager {
        &self.triggers
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn today(&self) -> DateKey {
        DateKey::of_instant(self.clock.now(), self.tz)
    }

    pub fn settings(&self) -> SyncSettings {
        self.settings.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn update_settings(&self, change: impl FnOnce(&mut SyncSettings)) -> SyncSettings {
        let mut settings = self.settings.write().unwrap_or_else(|e| e.into_inner());
        change(&mut settings);
        settings.clone()
    }

    fn with_store<R>(&self, f: impl FnOnce(&mut dyn LocalStore) -> DayDialResult<R>) -> DayDialResult<R> {
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut **store)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn events_on(&self, date_key: DateKey) -> DayDialResult<Vec<Event>> {
        self.with_store(|s| s.events_on(date_key))
    }

    pub fn events_in(&self, range: &DateRange) -> DayDialResult<Vec<Event>> {
        self.with_store(|s| s.events_in(range))
    }

    pub fn event(&self, id: &str) -> DayDialResult<Option<Event>> {
        self.with_store(|s| s.event(id))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Store a new event, schedule its reminders and, when sync is on, push
    /// it to the target calendar. A failed push leaves the event pending.
    #[instrument(skip(self, event), fields(event_id = %event.id, date_key = %event.date_key))]
    pub async fn add_event(&self, event: Event) -> DayDialResult<Event> {
        let push_target = self.settings().push_target().map(str::to_string);
        self.insert(event, push_target.as_deref()).await
    }

    async fn insert(&self, mut event: Event, push_target: Option<&str>) -> DayDialResult<Event> {
        event.validate()?;
        let _guard = self.locks.lock(&event.id).await;

        event.last_modified = self.clock.now();
        event.sync_state = SyncState::Local;
        event.external_event_id = None;
        event.external_calendar_id = None;
        self.with_store(|s| s.put(&event))?;

        let day = event.date_key;
        event.notification_settings.trigger_ids = self.triggers.schedule(&event, day).await;

        if let Some(target) = push_target {
            // Failure is recorded on the event; the local add still succeeds.
            let _ = self.push_event(&mut event, target).await;
        }

        self.with_store(|s| s.put(&event))?;
        self.bus.emit(day);
        info!(title = %event.title, sync_state = ?event.sync_state, "event added");
        Ok(event)
    }

    /// Replace an event's user-visible fields, rebuild its reminders and
    /// mirror the change to its external record.
    ///
    /// The external link is owned by the coordinator; whatever link `event`
    /// carries is ignored.
    #[instrument(skip(self, event), fields(event_id = %event.id, date_key = %event.date_key))]
    pub async fn update_event(&self, mut event: Event) -> DayDialResult<Event> {
        event.validate()?;
        let _guard = self.locks.lock(&event.id).await;

        let existing = self
            .with_store(|s| s.event(&event.id))?
            .ok_or_else(|| DayDialError::EventNotFound(event.id.clone()))?;

        event.external_event_id = existing.external_event_id.clone();
        event.external_calendar_id = existing.external_calendar_id.clone();
        event.sync_state = existing.sync_state;
        event.is_from_calendar = existing.is_from_calendar;
        event.notification_settings.trigger_ids = existing.notification_settings.trigger_ids.clone();
        event.last_modified = self.clock.now();

        let day = event.date_key;
        self.triggers.reschedule(&mut event, day).await;
        self.with_store(|s| s.put(&event))?;

        let settings = self.settings();
        if settings.calendar_sync_enabled
            && (event.is_linked() || event.sync_state == SyncState::PendingPush)
        {
            let target = settings
                .target_calendar_id
                .clone()
                .or_else(|| event.external_calendar_id.clone());
            if let Some(target) = target {
                let _ = self.push_event(&mut event, &target).await;
                self.with_store(|s| s.put(&event))?;
            }
        }

        if existing.date_key != day {
            self.bus.emit(existing.date_key);
        }
        self.bus.emit(day);
        info!(sync_state = ?event.sync_state, "event updated");
        Ok(event)
    }

    /// Toggle completion. Local only: reminders and the external record
    /// are left alone.
    pub async fn set_completed(&self, id: &str, completed: bool) -> DayDialResult<Event> {
        let _guard = self.locks.lock(id).await;
        let mut event = self
            .with_store(|s| s.event(id))?
            .ok_or_else(|| DayDialError::EventNotFound(id.to_string()))?;
        event.is_completed = completed;
        self.with_store(|s| s.put(&event))?;
        self.bus.emit(event.date_key);
        Ok(event)
    }

    /// Cancel the reminders, delete the external record (best effort) and
    /// remove the event. Returns `None` when there was no such event.
    #[instrument(skip(self))]
    pub async fn delete_event(&self, id: &str) -> DayDialResult<Option<Event>> {
        let _guard = self.locks.lock(id).await;

        let Some(event) = self.with_store(|s| s.event(id))? else {
            return Ok(None);
        };

        self.triggers.cancel_event(&event).await;

        // Also with sync off: a surviving record would come back on the next pull.
        if let Some(external_id) = &event.external_event_id {
            if let Err(e) = self.adapter.delete(external_id).await {
                warn!(external_id = %external_id, error = %e, "could not delete external record");
            }
        }

        self.with_store(|s| s.remove(id))?;
        self.bus.emit(event.date_key);
        info!(title = %event.title, "event deleted");
        Ok(Some(event))
    }

    /// Push one event to the target calendar now, whatever its state.
    #[instrument(skip(self))]
    pub async fn export_event(&self, id: &str) -> DayDialResult<Event> {
        let target = self
            .settings()
            .target_calendar_id
            .ok_or_else(|| DayDialError::SourceNotFound("no target calendar configured".to_string()))?;

        let _guard = self.locks.lock(id).await;
        let mut event = self
            .with_store(|s| s.event(id))?
            .ok_or_else(|| DayDialError::EventNotFound(id.to_string()))?;

        let result = self.push_event(&mut event, &target).await;
        self.with_store(|s| s.put(&event))?;
        self.bus.emit(event.date_key);
        result.map(|()| event)
    }

    /// Add every task of an import batch as a local event.
    ///
    /// Imported events stay unlinked until they are exported explicitly.
    /// One outcome per task, in order.
    #[instrument(skip(self, tasks), fields(count = tasks.len()))]
    pub async fn import_tasks(&self, tasks: &[ImportedTask]) -> Vec<DayDialResult<Event>> {
        let mut outcomes = Vec::with_capacity(tasks.len());
        for task in tasks {
            let outcome = match task.to_event(&self.default_reminders) {
                Ok(event) => self.insert(event, None).await,
                Err(e) => Err(e),
            };
            if let Err(e) = &outcome {
                warn!(title = %task.title, error = %e, "skipping imported task");
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Ask for notification permission and schedule the reminders of every
    /// upcoming event. A denial is reported here and nowhere else.
    #[instrument(skip(self))]
    pub async fn enable_notifications(&self) -> DayDialResult<usize> {
        self.triggers.request_permission().await?;

        let today = self.today();
        let range = self.settings().window(today);
        let upcoming: Vec<Event> = self
            .events_in(&range)?
            .into_iter()
            .filter(|e| e.date_key >= today)
            .collect();

        let mut scheduled = 0;
        for event in upcoming {
            let _guard = self.locks.lock(&event.id).await;
            let Some(mut event) = self.with_store(|s| s.event(&event.id))? else {
                continue;
            };
            let day = event.date_key;
            scheduled += self.triggers.reschedule(&mut event, day).await.len();
            self.with_store(|s| s.put(&event))?;
        }

        info!(scheduled, "notifications enabled");
        Ok(scheduled)
    }

    /// Choose which calendars are imported. Local copies of events from
    /// calendars that are no longer fetched are removed.
    #[instrument(skip(self))]
    pub async fn set_selected_calendars(&self, calendar_ids: Vec<String>) -> DayDialResult<usize> {
        let settings = self.update_settings(|s| s.selected_calendar_ids = calendar_ids);
        let kept: HashSet<String> = settings.fetched_calendar_ids().into_iter().collect();

        let orphaned: Vec<Event> = self
            .with_store(|s| s.all_events())?
            .into_iter()
            .filter(|e| e.is_from_calendar)
            .filter(|e| {
                e.external_calendar_id
                    .as_ref()
                    .is_some_and(|c| !kept.contains(c))
            })
            .collect();

        let mut removed = 0;
        for event in orphaned {
            let _guard = self.locks.lock(&event.id).await;
            self.triggers.cancel_event(&event).await;
            if self.with_store(|s| s.remove(&event.id))?.is_some() {
                self.bus.emit(event.date_key);
                removed += 1;
            }
        }

        info!(removed, "calendar selection changed");
        Ok(removed)
    }

    /// Create or update the external record of `event` and record the
    /// outcome on it. A record that vanished outside the app is recreated.
    ///
    /// A new link is stored before returning, so a concurrent reconcile
    /// never takes the fresh record for an unknown one.
    async fn push_event(&self, event: &mut Event, target: &str) -> DayDialResult<()> {
        let _links = self.links.read().await;
        let result = match self.adapter.push(event, target).await {
            Err(DayDialError::ExternalRecordNotFound(external_id)) => {
                info!(event_id = %event.id, %external_id, "external record vanished, recreating it");
                event.unlink_external();
                event.external_calendar_id = None;
                self.adapter.push(event, target).await
            }
            other => other,
        };

        match result {
            Ok(record) => {
                event.link_external(record.id, record.calendar_id);
                event.last_modified = record.last_modified;
                self.with_store(|s| s.put(event))
            }
            Err(e) => {
                // Linked events of read-only calendars cannot be pushed at all;
                // retrying would not help.
                if !(event.is_linked() && matches!(e, DayDialError::SourceNotFound(_))) {
                    event.sync_state = SyncState::PendingPush;
                }
                warn!(event_id = %event.id, error = %e, "push failed, keeping local copy");
                Err(e)
            }
        }
    }

    // =========================================================================
    // Reconcile
    // =========================================================================

    /// Bring local events of `range` in line with the external calendar.
    ///
    /// Concurrent calls for the same range share one pass. Does nothing
    /// while calendar sync is off.
    #[instrument(skip(self), fields(from = %range.from, to = %range.to))]
    pub async fn reconcile(&self, range: DateRange) -> DayDialResult<ReconcileReport> {
        let settings = self.settings();
        if !settings.calendar_sync_enabled {
            debug!("calendar sync is off, skipping reconcile");
            return Ok(ReconcileReport::default());
        }

        self.gate
            .coalesce(range, || self.reconcile_pass(range, settings))
            .await
    }

    async fn reconcile_pass(&self, range: DateRange, settings: SyncSettings) -> DayDialResult<ReconcileReport> {
        let mut report = ReconcileReport::default();

        self.retry_pending_pushes(&range, &settings, &mut report).await?;

        let calendar_ids = settings.fetched_calendar_ids();
        // Warms the source cache so converted events get their calendar color.
        self.adapter.all_sources().await?;
        let records = self.adapter.fetch_external_events(&range, &calendar_ids).await?;

        let mut external: Vec<Event> = records
            .iter()
            .map(|r| self.adapter.convert(r))
            .filter(|e| range.contains(e.date_key))
            .collect();
        let fetched: HashSet<String> = external
            .iter()
            .filter_map(|e| e.external_event_id.clone())
            .collect();

        let mut local: Vec<Event> = self
            .events_in(&range)?
            .into_iter()
            .filter(Event::is_linked)
            .collect();

        // Local copies that sit on another day than their record.
        let known: HashSet<String> = local.iter().filter_map(|e| e.external_event_id.clone()).collect();
        for external_id in fetched.iter().filter(|id| !known.contains(*id)) {
            if let Some(event) = self.with_store(|s| s.linked_to(external_id))? {
                local.push(event);
            }
        }

        // Records that moved out of the range are not deleted.
        for event in &local {
            let Some(external_id) = &event.external_event_id else {
                continue;
            };
            if fetched.contains(external_id) {
                continue;
            }
            if let Some(record) = self.adapter.fetch_record(external_id).await? {
                external.push(self.adapter.convert(&record));
            }
        }

        let plan = ReconcilePlan::from_events(local, external, &calendar_ids);
        let (create, update, delete) = plan.pull_counts();
        debug!(
            create,
            update,
            delete,
            push = plan.to_push.len(),
            settled = plan.settled.len(),
            "reconcile plan"
        );

        for diff in &plan.to_pull {
            match self.apply_pull(diff).await {
                Ok(true) => {
                    debug!(%diff, "local copy {}", diff.kind.past_tense());
                    match diff.kind {
                        DiffKind::Create => report.created += 1,
                        DiffKind::Update => report.updated += 1,
                        DiffKind::Delete => report.deleted += 1,
                    }
                }
                Ok(false) => debug!(%diff, "local copy changed during reconcile, skipped"),
                Err(e) => {
                    warn!(%diff, error = %e, "could not apply external change");
                    report.failed += 1;
                }
            }
        }

        for diff in &plan.to_push {
            match self.apply_push(diff, &settings).await {
                Ok(true) => report.pushed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(%diff, error = %e, "could not push local change");
                    report.failed += 1;
                }
            }
        }

        for settled in &plan.settled {
            let _guard = self.locks.lock(&settled.id).await;
            if let Some(mut current) = self.with_store(|s| s.event(&settled.id))? {
                if current.sync_state == SyncState::PendingPull {
                    current.sync_state = SyncState::SyncedExternal;
                    self.with_store(|s| s.put(&current))?;
                }
            }
        }

        info!(
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            pushed = report.pushed,
            retried = report.retried,
            failed = report.failed,
            "reconcile finished"
        );
        Ok(report)
    }

    async fn retry_pending_pushes(
        &self,
        range: &DateRange,
        settings: &SyncSettings,
        report: &mut ReconcileReport,
    ) -> DayDialResult<()> {
        let pending: Vec<String> = self
            .events_in(range)?
            .into_iter()
            .filter(|e| e.sync_state == SyncState::PendingPush)
            .map(|e| e.id)
            .collect();

        for id in pending {
            let _guard = self.locks.lock(&id).await;
            let Some(mut event) = self.with_store(|s| s.event(&id))? else {
                continue;
            };
            if event.sync_state != SyncState::PendingPush {
                continue;
            }
            let Some(target) = settings
                .target_calendar_id
                .clone()
                .or_else(|| event.external_calendar_id.clone())
            else {
                continue;
            };

            match self.push_event(&mut event, &target).await {
                Ok(()) => report.retried += 1,
                Err(_) => report.failed += 1,
            }
            self.with_store(|s| s.put(&event))?;
        }
        Ok(())
    }

    /// Apply one external change locally. Returns false when the local
    /// event was edited since the plan was made; the next pass sees it again.
    async fn apply_pull(&self, diff: &EventDiff) -> DayDialResult<bool> {
        match diff.kind {
            DiffKind::Create => {
                let Some(new) = &diff.new else { return Ok(false) };
                let Some(external_id) = &new.external_event_id else {
                    return Ok(false);
                };
                let _links = self.links.write().await;
                // Linked meanwhile by a push or by an overlapping pass.
                if let Some(existing) = self.with_store(|s| s.linked_to(external_id))? {
                    debug!(event_id = %existing.id, %external_id, "record already has a local copy");
                    return Ok(false);
                }

                let mut event = new.clone();
                let _guard = self.locks.lock(&event.id).await;
                let day = event.date_key;
                event.notification_settings.trigger_ids = self.triggers.schedule(&event, day).await;
                self.with_store(|s| s.put(&event))?;
                self.bus.emit(day);
                Ok(true)
            }
            DiffKind::Update => {
                let (Some(old), Some(new)) = (&diff.old, &diff.new) else {
                    return Ok(false);
                };
                let _guard = self.locks.lock(&old.id).await;
                let Some(current) = self.unchanged_since_plan(old)? else {
                    return Ok(false);
                };

                let mut event = new.clone();
                event.notification_settings.trigger_ids = current.notification_settings.trigger_ids.clone();
                let day = event.date_key;
                self.triggers.reschedule(&mut event, day).await;
                self.with_store(|s| s.put(&event))?;

                if current.date_key != day {
                    self.bus.emit(current.date_key);
                }
                self.bus.emit(day);
                Ok(true)
            }
            DiffKind::Delete => {
                let Some(old) = &diff.old else { return Ok(false) };
                let _guard = self.locks.lock(&old.id).await;
                let Some(current) = self.unchanged_since_plan(old)? else {
                    return Ok(false);
                };

                self.triggers.cancel_event(&current).await;
                self.with_store(|s| s.remove(&current.id))?;
                self.bus.emit(current.date_key);
                Ok(true)
            }
        }
    }

    /// Push one local copy that won over the external one.
    async fn apply_push(&self, diff: &EventDiff, settings: &SyncSettings) -> DayDialResult<bool> {
        let Some(local) = &diff.new else { return Ok(false) };
        let _guard = self.locks.lock(&local.id).await;
        let Some(mut event) = self.unchanged_since_plan(local)? else {
            return Ok(false);
        };

        let target = settings
            .target_calendar_id
            .clone()
            .or_else(|| event.external_calendar_id.clone())
            .unwrap_or_default();
        let result = self.push_event(&mut event, &target).await;
        self.with_store(|s| s.put(&event))?;
        result.map(|()| true)
    }

    /// The stored event if it still is the version the plan was made from.
    fn unchanged_since_plan(&self, planned: &Event) -> DayDialResult<Option<Event>> {
        Ok(self
            .with_store(|s| s.event(&planned.id))?
            .filter(|current| {
                current.last_modified == planned.last_modified && current.sync_state == planned.sync_state
            }))
    }

    /// React to the external store's change signal: mark synced events of
    /// the recent-and-upcoming window as pending pull and reconcile it.
    #[instrument(skip(self))]
    pub async fn on_external_change(&self) -> DayDialResult<ReconcileReport> {
        let settings = self.settings();
        if !settings.calendar_sync_enabled {
            return Ok(ReconcileReport::default());
        }

        let range = settings.window(self.today());
        let synced: Vec<String> = self
            .events_in(&range)?
            .into_iter()
            .filter(|e| e.sync_state == SyncState::SyncedExternal)
            .map(|e| e.id)
            .collect();

        for id in synced {
            let _guard = self.locks.lock(&id).await;
            if let Some(mut event) = self.with_store(|s| s.event(&id))? {
                if event.sync_state == SyncState::SyncedExternal {
                    event.sync_state = SyncState::PendingPull;
                    self.with_store(|s| s.put(&event))?;
                }
            }
        }

        self.reconcile(range).await
    }

    /// Reconcile on every external change signal until the store goes away.
    pub async fn watch_external_changes(self: Arc<Self>) {
        let mut changes = self.adapter.changes();
        loop {
            match changes.recv().await {
                Ok(()) | Err(RecvError::Lagged(_)) => {
                    // Signals that arrived meanwhile are covered by this pass.
                    while changes.try_recv().is_ok() {}
                    match self.on_external_change().await {
                        Ok(report) if !report.is_empty() => info!(%report, "applied external changes"),
                        Ok(_) => {}
                        Err(e) if e.is_retryable() => {
                            debug!(error = %e, "reconcile failed, retrying on the next change")
                        }
                        Err(e) => warn!(error = %e, "reconcile after external change failed"),
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}
