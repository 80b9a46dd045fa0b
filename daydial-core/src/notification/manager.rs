//! Computes, schedules and cancels the reminders of an event.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::constants::TRIGGER_SAFETY_MARGIN_SECS;
use crate::date_key::DateKey;
use crate::error::{DayDialError, DayDialResult, Permission};
use crate::event::Event;
use crate::notification::{
    NotificationScheduler, NotificationTrigger, PermissionStatus, TriggerHandle, TriggerPayload,
};

pub struct TriggerManager {
    scheduler: Arc<dyn NotificationScheduler>,
    clock: Arc<dyn Clock>,
    tz: Tz,
    // Serializes schedule/cancel so a reschedule is never observed half-done.
    guard: Mutex<()>,
}

impl TriggerManager {
    pub fn new(scheduler: Arc<dyn NotificationScheduler>, clock: Arc<dyn Clock>, tz: Tz) -> Self {
        TriggerManager {
            scheduler,
            clock,
            tz,
            guard: Mutex::new(()),
        }
    }

    /// Every reminder of `event` anchored on `on_date` that still lies at least
    /// the safety margin after `now`. Pure; nothing is scheduled.
    pub fn plan(&self, event: &Event, on_date: DateKey, now: DateTime<Utc>) -> Vec<NotificationTrigger> {
        if !event.notification_settings.enabled {
            return Vec::new();
        }

        let starts_at = on_date.instant_at(event.start_hour, self.tz);
        let earliest = now + Duration::seconds(TRIGGER_SAFETY_MARGIN_SECS);

        event
            .notification_settings
            .minutes_before
            .iter()
            .map(|&minutes| (minutes, starts_at - Duration::minutes(i64::from(minutes))))
            .filter(|(_, fires_at)| *fires_at >= earliest)
            .map(|(minutes, fires_at)| NotificationTrigger {
                handle: TriggerHandle::derive(&event.id, minutes),
                event_id: event.id.clone(),
                fires_at,
                minutes_before: minutes,
                payload: TriggerPayload::for_event(event, minutes),
            })
            .collect()
    }

    /// Schedule the reminders of `event` for `on_date`.
    ///
    /// Returns the handles that were actually scheduled: none without
    /// notification permission, and none for reminders already in the past.
    pub async fn schedule(&self, event: &Event, on_date: DateKey) -> Vec<TriggerHandle> {
        let _guard = self.guard.lock().await;
        self.schedule_locked(event, on_date).await
    }

    async fn schedule_locked(&self, event: &Event, on_date: DateKey) -> Vec<TriggerHandle> {
        if self.scheduler.permission().await != PermissionStatus::Granted {
            debug!(event_id = %event.id, "notification permission not granted, skipping reminders");
            return Vec::new();
        }

        let mut handles = Vec::new();
        for trigger in self.plan(event, on_date, self.clock.now()) {
            let handle = trigger.handle.clone();
            match self.scheduler.add(trigger).await {
                Ok(()) => handles.push(handle),
                Err(e) => warn!(event_id = %event.id, %handle, error = %e, "failed to schedule reminder"),
            }
        }

        debug!(event_id = %event.id, date_key = %on_date, scheduled = handles.len(), "reminders scheduled");
        handles
    }

    /// Cancel the given reminders. Unknown or already-fired handles are ignored.
    pub async fn cancel(&self, handles: &[TriggerHandle]) {
        let _guard = self.guard.lock().await;
        self.cancel_locked(handles).await;
    }

    async fn cancel_locked(&self, handles: &[TriggerHandle]) {
        if handles.is_empty() {
            return;
        }
        if let Err(e) = self.scheduler.remove(handles).await {
            warn!(count = handles.len(), error = %e, "failed to cancel reminders");
        }
    }

    /// Cancel every reminder that belongs to `event`: the recorded handles,
    /// the handles derivable from its offsets, and any pending trigger that
    /// points at its id.
    pub async fn cancel_event(&self, event: &Event) {
        let _guard = self.guard.lock().await;
        let handles = self.handles_of(event).await;
        self.cancel_locked(&handles).await;
    }

    async fn handles_of(&self, event: &Event) -> Vec<TriggerHandle> {
        let mut handles: BTreeSet<TriggerHandle> =
            event.notification_settings.trigger_ids.iter().cloned().collect();

        handles.extend(
            event
                .notification_settings
                .minutes_before
                .iter()
                .map(|&m| TriggerHandle::derive(&event.id, m)),
        );

        match self.scheduler.pending().await {
            Ok(pending) => handles.extend(
                pending
                    .into_iter()
                    .filter(|t| t.event_id == event.id)
                    .map(|t| t.handle),
            ),
            Err(e) => warn!(event_id = %event.id, error = %e, "could not list pending reminders"),
        }

        handles.into_iter().collect()
    }

    /// Cancel-then-recreate the reminders of `event` and record the new
    /// handles on it. Runs under one lock, so no caller sees the gap.
    pub async fn reschedule(&self, event: &mut Event, on_date: DateKey) -> Vec<TriggerHandle> {
        let _guard = self.guard.lock().await;

        let stale = self.handles_of(event).await;
        self.cancel_locked(&stale).await;

        let handles = self.schedule_locked(event, on_date).await;
        event.notification_settings.trigger_ids = handles.clone();
        handles
    }

    /// Show the permission prompt if it was never answered.
    ///
    /// Errors with `NotAuthorized` when the user said no, so the caller can
    /// tell them at the moment they turn reminders on.
    pub async fn request_permission(&self) -> DayDialResult<()> {
        match self.scheduler.permission().await {
            PermissionStatus::Granted => Ok(()),
            PermissionStatus::Denied => Err(DayDialError::NotAuthorized(Permission::Notifications)),
            PermissionStatus::NotDetermined => {
                if self.scheduler.request_permission().await? {
                    Ok(())
                } else {
                    Err(DayDialError::NotAuthorized(Permission::Notifications))
                }
            }
        }
    }

    pub async fn permission(&self) -> PermissionStatus {
        self.scheduler.permission().await
    }

    pub async fn pending(&self) -> DayDialResult<Vec<NotificationTrigger>> {
        self.scheduler.pending().await
    }
}
