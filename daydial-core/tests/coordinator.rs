use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;

use daydial_core::calendar::{convert, AuthorizationStatus, CalendarAdapter, CalendarSource, ExternalRecord, MemoryCalendarStore};
use daydial_core::clock::{Clock, MockClock};
use daydial_core::date_key::DateKey;
use daydial_core::date_range::DateRange;
use daydial_core::error::{DayDialError, Permission};
use daydial_core::event::{Event, SyncState};
use daydial_core::import::ImportedTask;
use daydial_core::notification::{MemoryScheduler, NotificationScheduler, PermissionStatus, TriggerManager};
use daydial_core::store::{LocalStore, MemoryStore};
use daydial_core::sync::{SyncCoordinator, SyncSettings};

const TZ: Tz = chrono_tz::UTC;

struct Harness {
    clock: Arc<MockClock>,
    calendar: Arc<MemoryCalendarStore>,
    scheduler: Arc<MemoryScheduler>,
    coordinator: Arc<SyncCoordinator>,
}

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 20, h, m, 0).unwrap()
}

fn day() -> DateKey {
    DateKey::parse("2025-03-20").unwrap()
}

fn key(s: &str) -> DateKey {
    DateKey::parse(s).unwrap()
}

fn synced_settings() -> SyncSettings {
    SyncSettings {
        calendar_sync_enabled: true,
        target_calendar_id: Some("work".into()),
        ..Default::default()
    }
}

fn harness_with(calendar: MemoryCalendarStore, scheduler: MemoryScheduler, settings: SyncSettings) -> Harness {
    harness_with_store(calendar, scheduler, settings, MemoryStore::new())
}

fn harness_with_store(
    calendar: MemoryCalendarStore,
    scheduler: MemoryScheduler,
    settings: SyncSettings,
    store: MemoryStore,
) -> Harness {
    let clock = Arc::new(MockClock::at(at(8, 0)));
    let as_clock: Arc<dyn Clock> = clock.clone();

    let calendar = Arc::new(calendar.with_clock(as_clock.clone()));
    let scheduler = Arc::new(scheduler);
    let adapter = Arc::new(CalendarAdapter::new(calendar.clone(), TZ));
    let triggers = Arc::new(TriggerManager::new(scheduler.clone(), as_clock.clone(), TZ));

    let coordinator = Arc::new(SyncCoordinator::new(
        Box::new(store),
        adapter,
        triggers,
        settings,
        as_clock,
    ));

    Harness {
        clock,
        calendar,
        scheduler,
        coordinator,
    }
}

fn harness() -> Harness {
    harness_with(
        MemoryCalendarStore::with_calendars(&["work", "holidays"]),
        MemoryScheduler::granted(),
        synced_settings(),
    )
}

fn record(calendar_id: &str, title: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> ExternalRecord {
    ExternalRecord {
        id: String::new(),
        calendar_id: calendar_id.to_string(),
        title: title.to_string(),
        notes: None,
        start,
        end,
        alarms: vec![-10],
        last_modified: at(7, 0),
    }
}

fn fire_times(h: &Harness, event_id: &str) -> Vec<DateTime<Utc>> {
    let mut times: Vec<_> = h.scheduler.pending_for(event_id).into_iter().map(|t| t.fires_at).collect();
    times.sort();
    times
}

fn standup() -> Event {
    Event::new("Standup", day(), 9.0, 9.5)
        .with_emoji("☕")
        .with_reminders([15, 5])
}

#[tokio::test]
async fn test_add_event_schedules_reminders_and_pushes() {
    let h = harness();
    let event = h.coordinator.add_event(standup()).await.unwrap();

    assert_eq!(fire_times(&h, &event.id), vec![at(8, 45), at(8, 55)]);
    assert_eq!(event.sync_state, SyncState::SyncedExternal);
    assert_eq!(event.external_calendar_id.as_deref(), Some("work"));

    let external_id = event.external_event_id.clone().unwrap();
    let pushed = h.calendar.record(&external_id).unwrap();
    assert_eq!(pushed.title, "☕ Standup");
    assert_eq!(pushed.start, at(9, 0));
    assert_eq!(pushed.end, at(9, 30));
    assert!(pushed.alarms.contains(&-15) && pushed.alarms.contains(&-5));

    let stored = h.coordinator.event(&event.id).unwrap().unwrap();
    assert_eq!(stored.notification_settings.trigger_ids.len(), 2);
}

#[tokio::test]
async fn test_moving_standup_leaves_exactly_two_live_triggers() {
    let h = harness();
    let mut event = h.coordinator.add_event(standup()).await.unwrap();

    event.start_hour = 9.5;
    event.end_hour = 10.0;
    let event = h.coordinator.update_event(event).await.unwrap();

    assert_eq!(fire_times(&h, &event.id), vec![at(9, 15), at(9, 25)]);
    assert_eq!(h.scheduler.pending().await.unwrap().len(), 2);

    let pushed = h.calendar.record(event.external_event_id.as_deref().unwrap()).unwrap();
    assert_eq!(pushed.start, at(9, 30));
}

#[tokio::test]
async fn test_reminder_before_midnight_is_not_scheduled() {
    let h = harness();
    h.clock.set(at(0, 5));

    let event = Event::new("Night owl", day(), 10.0 / 60.0, 0.5).with_reminders([30]);
    let event = h.coordinator.add_event(event).await.unwrap();

    assert!(fire_times(&h, &event.id).is_empty());
    assert!(event.notification_settings.trigger_ids.is_empty());
}

#[tokio::test]
async fn test_delete_cleans_up_triggers_and_external_record() {
    let h = harness();
    let event = h.coordinator.add_event(standup()).await.unwrap();
    let external_id = event.external_event_id.clone().unwrap();
    let mut changes = h.coordinator.bus().subscribe();

    let removed = h.coordinator.delete_event(&event.id).await.unwrap();

    assert_eq!(removed.unwrap().id, event.id);
    assert!(h.scheduler.pending_for(&event.id).is_empty());
    assert!(h.calendar.record(&external_id).is_none());
    assert!(h.coordinator.event(&event.id).unwrap().is_none());
    assert_eq!(changes.recv().await.unwrap().date_key, day());

    assert!(h.coordinator.delete_event(&event.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_survives_external_failure() {
    let h = harness();
    let event = h.coordinator.add_event(standup()).await.unwrap();
    h.calendar.set_unavailable(true);

    assert!(h.coordinator.delete_event(&event.id).await.unwrap().is_some());
    assert!(h.coordinator.event(&event.id).unwrap().is_none());
    assert!(h.scheduler.pending_for(&event.id).is_empty());
}

#[tokio::test]
async fn test_delete_with_sync_off_still_removes_external_record() {
    let h = harness();
    let event = h.coordinator.add_event(standup()).await.unwrap();
    let external_id = event.external_event_id.clone().unwrap();

    h.coordinator.update_settings(|s| s.calendar_sync_enabled = false);
    h.coordinator.delete_event(&event.id).await.unwrap();
    assert!(h.calendar.record(&external_id).is_none());

    h.coordinator.update_settings(|s| s.calendar_sync_enabled = true);
    let report = h.coordinator.reconcile(DateRange::single(day())).await.unwrap();
    assert_eq!(report.created, 0);
    assert!(h.coordinator.events_on(day()).unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_push_is_retried_on_reconcile() {
    let h = harness();
    h.calendar.set_unavailable(true);

    let event = h.coordinator.add_event(standup()).await.unwrap();
    assert_eq!(event.sync_state, SyncState::PendingPush);
    assert!(event.external_event_id.is_none());
    // Reminders do not depend on the calendar.
    assert_eq!(fire_times(&h, &event.id).len(), 2);

    h.calendar.set_unavailable(false);
    let report = h.coordinator.reconcile(DateRange::single(day())).await.unwrap();

    assert_eq!(report.retried, 1);
    let stored = h.coordinator.event(&event.id).unwrap().unwrap();
    assert_eq!(stored.sync_state, SyncState::SyncedExternal);
    assert_eq!(h.calendar.records().len(), 1);
}

#[tokio::test]
async fn test_update_recreates_record_deleted_outside() {
    let h = harness();
    let mut event = h.coordinator.add_event(standup()).await.unwrap();
    let old_id = event.external_event_id.clone().unwrap();
    h.calendar.remove_external(&old_id);

    event.title = "Daily standup".into();
    let event = h.coordinator.update_event(event).await.unwrap();

    let new_id = event.external_event_id.clone().unwrap();
    assert_ne!(new_id, old_id);
    assert_eq!(event.sync_state, SyncState::SyncedExternal);
    assert_eq!(h.calendar.record(&new_id).unwrap().title, "☕ Daily standup");
}

#[tokio::test]
async fn test_reconcile_imports_updates_and_deletes() {
    let h = harness();
    let range = DateRange::single(day());
    let ext_id = h.calendar.insert_external(record("work", "🍝 Lunch", at(12, 0), at(13, 0)));

    let report = h.coordinator.reconcile(range).await.unwrap();
    assert_eq!(report.created, 1);

    let events = h.coordinator.events_on(day()).unwrap();
    assert_eq!(events.len(), 1);
    let lunch = &events[0];
    assert_eq!(lunch.title, "Lunch");
    assert_eq!(lunch.emoji, "🍝");
    assert_eq!((lunch.start_hour, lunch.end_hour), (12.0, 13.0));
    assert!(lunch.is_from_calendar);
    assert_eq!(fire_times(&h, &lunch.id), vec![at(11, 50)]);

    h.clock.advance(Duration::minutes(5));
    h.calendar.edit_external(&ext_id, |r| r.title = "🍝 Team lunch".into());
    let report = h.coordinator.reconcile(range).await.unwrap();
    assert_eq!(report.updated, 1);
    let updated = h.coordinator.event(&lunch.id).unwrap().unwrap();
    assert_eq!(updated.title, "Team lunch");

    h.calendar.remove_external(&ext_id);
    let report = h.coordinator.reconcile(range).await.unwrap();
    assert_eq!(report.deleted, 1);
    assert!(h.coordinator.events_on(day()).unwrap().is_empty());
    assert!(h.scheduler.pending_for(&lunch.id).is_empty());
}

#[tokio::test]
async fn test_reconcile_converges() {
    let h = harness();
    let range = DateRange::single(day());
    h.calendar.insert_external(record("work", "Lunch", at(12, 0), at(13, 0)));
    h.coordinator.add_event(standup()).await.unwrap();

    h.coordinator.reconcile(range).await.unwrap();
    let again = h.coordinator.reconcile(range).await.unwrap();

    assert!(again.is_empty(), "second pass changed something: {again}");
    assert_eq!(h.coordinator.events_on(day()).unwrap().len(), 2);
    assert_eq!(h.calendar.records().len(), 2);
}

#[tokio::test]
async fn test_record_moved_out_of_range_moves_local_copy() {
    let h = harness();
    let event = h.coordinator.add_event(standup()).await.unwrap();
    let ext_id = event.external_event_id.clone().unwrap();

    h.clock.advance(Duration::minutes(1));
    let later = Utc.with_ymd_and_hms(2025, 3, 25, 9, 0, 0).unwrap();
    h.calendar.edit_external(&ext_id, |r| {
        r.start = later;
        r.end = later + Duration::minutes(30);
    });

    let report = h.coordinator.reconcile(DateRange::single(day())).await.unwrap();

    assert_eq!(report.updated, 1);
    assert_eq!(report.deleted, 0);
    let moved = h.coordinator.event(&event.id).unwrap().unwrap();
    assert_eq!(moved.date_key, key("2025-03-25"));
    assert!(h.coordinator.events_on(day()).unwrap().is_empty());
}

#[tokio::test]
async fn test_external_change_pulls_into_window() {
    let h = harness();
    let event = h.coordinator.add_event(standup()).await.unwrap();
    let ext_id = event.external_event_id.clone().unwrap();

    h.calendar.edit_external(&ext_id, |r| r.title = "☕ Standup (moved room)".into());
    let report = h.coordinator.on_external_change().await.unwrap();

    assert_eq!(report.updated, 1);
    let stored = h.coordinator.event(&event.id).unwrap().unwrap();
    assert_eq!(stored.title, "Standup (moved room)");
    assert_eq!(stored.sync_state, SyncState::SyncedExternal);
    assert_eq!(fire_times(&h, &event.id).len(), 2);
}

#[tokio::test]
async fn test_external_change_settles_unchanged_events() {
    let h = harness();
    let event = h.coordinator.add_event(standup()).await.unwrap();

    h.calendar.notify_change();
    let report = h.coordinator.on_external_change().await.unwrap();

    assert!(report.is_empty());
    let stored = h.coordinator.event(&event.id).unwrap().unwrap();
    assert_eq!(stored.sync_state, SyncState::SyncedExternal);
}

#[tokio::test]
async fn test_concurrent_reconciles_do_not_duplicate() {
    let h = harness();
    let range = DateRange::single(day());
    h.calendar.insert_external(record("work", "Lunch", at(12, 0), at(13, 0)));

    let (a, b) = tokio::join!(h.coordinator.reconcile(range), h.coordinator.reconcile(range));

    assert_eq!(a.unwrap().created + b.unwrap().created, 1);
    assert_eq!(h.coordinator.events_on(day()).unwrap().len(), 1);
}

#[tokio::test]
async fn test_reconcile_during_push_keeps_one_copy() {
    let h = harness();
    h.calendar.set_create_latency(StdDuration::from_millis(100));

    let coordinator = h.coordinator.clone();
    let adding = tokio::spawn(async move { coordinator.add_event(standup()).await });
    // The record exists externally, but the push has not stored its link yet.
    tokio::time::sleep(StdDuration::from_millis(20)).await;
    let report = h.coordinator.reconcile(DateRange::single(day())).await.unwrap();
    let event = adding.await.unwrap().unwrap();

    assert_eq!(report.created, 0);
    assert_eq!(h.calendar.records().len(), 1);
    let events = h.coordinator.events_on(day()).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, event.id);
    assert_eq!(h.scheduler.pending().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_overlapping_reconciles_import_once() {
    let h = harness();
    h.calendar.insert_external(record("work", "Lunch", at(12, 0), at(13, 0)));
    h.calendar.set_query_latency(StdDuration::from_millis(20));

    let week = DateRange::new(day(), key("2025-03-26")).unwrap();
    let (a, b) = tokio::join!(
        h.coordinator.reconcile(DateRange::single(day())),
        h.coordinator.reconcile(week)
    );

    assert_eq!(a.unwrap().created + b.unwrap().created, 1);
    assert_eq!(h.coordinator.events_on(day()).unwrap().len(), 1);
    assert_eq!(h.scheduler.pending().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_reconcile_removes_duplicate_local_copies() {
    let calendar = MemoryCalendarStore::with_calendars(&["work"]);
    let ext_id = calendar.insert_external(record("work", "🍝 Lunch", at(12, 0), at(13, 0)));
    let lunch = calendar.record(&ext_id).unwrap();

    // Two local copies of one record.
    let kept = convert::from_record(&lunch, TZ);
    let mut extra = convert::from_record(&lunch, TZ);
    extra.last_modified = lunch.last_modified + Duration::minutes(1);
    let mut store = MemoryStore::new();
    store.put(&kept).unwrap();
    store.put(&extra).unwrap();

    let h = harness_with_store(calendar, MemoryScheduler::granted(), synced_settings(), store);
    h.coordinator.triggers().schedule(&extra, day()).await;

    let report = h.coordinator.reconcile(DateRange::single(day())).await.unwrap();

    assert_eq!(report.deleted, 1);
    let events = h.coordinator.events_on(day()).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, kept.id);
    assert!(h.scheduler.pending_for(&extra.id).is_empty());
    assert!(h.calendar.record(&ext_id).is_some());
}

#[tokio::test]
async fn test_reconcile_does_nothing_with_sync_off() {
    let h = harness_with(
        MemoryCalendarStore::with_calendars(&["work"]),
        MemoryScheduler::granted(),
        SyncSettings::default(),
    );
    h.calendar.insert_external(record("work", "Lunch", at(12, 0), at(13, 0)));

    let event = h.coordinator.add_event(standup()).await.unwrap();
    let report = h.coordinator.reconcile(DateRange::single(day())).await.unwrap();

    assert!(report.is_empty());
    assert_eq!(event.sync_state, SyncState::Local);
    assert_eq!(h.calendar.records().len(), 1);
    assert_eq!(fire_times(&h, &event.id).len(), 2);
}

#[tokio::test]
async fn test_read_only_calendar_is_import_only() {
    let calendar = MemoryCalendarStore::with_calendars(&["work"]);
    calendar.add_calendar(CalendarSource {
        id: "holidays".into(),
        display_name: "Holidays".into(),
        color_tag: "red".into(),
        writable: false,
    });
    let h = harness_with(
        calendar,
        MemoryScheduler::granted(),
        SyncSettings {
            selected_calendar_ids: vec!["holidays".into()],
            ..synced_settings()
        },
    );
    h.calendar.insert_external(record("holidays", "🌷 Spring", at(0, 0), at(0, 0) + Duration::days(1)));

    h.coordinator.reconcile(DateRange::single(day())).await.unwrap();
    let holiday = h.coordinator.events_on(day()).unwrap().remove(0);
    assert_eq!(holiday.color_tag, "red");
    assert_eq!(holiday.end_hour, 24.0);

    let sources = h.coordinator.adapter().list_sources().await.unwrap();
    assert_eq!(sources.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(), vec!["work"]);

    let mut edited = holiday.clone();
    edited.title = "Spring break".into();
    let edited = h.coordinator.update_event(edited).await.unwrap();
    assert_eq!(edited.title, "Spring break");
    assert_eq!(edited.sync_state, SyncState::SyncedExternal);
}

#[tokio::test]
async fn test_deselected_calendar_events_are_purged() {
    let h = harness_with(
        MemoryCalendarStore::with_calendars(&["work", "holidays"]),
        MemoryScheduler::granted(),
        SyncSettings {
            selected_calendar_ids: vec!["holidays".into()],
            ..synced_settings()
        },
    );
    h.calendar.insert_external(record("holidays", "Spring", at(10, 0), at(11, 0)));
    let mine = h.coordinator.add_event(standup()).await.unwrap();
    h.coordinator.reconcile(DateRange::single(day())).await.unwrap();
    assert_eq!(h.coordinator.events_on(day()).unwrap().len(), 2);

    let removed = h.coordinator.set_selected_calendars(Vec::new()).await.unwrap();

    assert_eq!(removed, 1);
    let left = h.coordinator.events_on(day()).unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, mine.id);
}

#[tokio::test]
async fn test_imported_tasks_stay_local_until_exported() {
    let h = harness();
    let tasks = vec![
        ImportedTask {
            title: "Gym".into(),
            description: None,
            start_time: "18:00".into(),
            end_time: "19:00".into(),
            date_key: day(),
            emoji: Some("🏋️".into()),
            color_tag: None,
        },
        ImportedTask {
            title: "Broken".into(),
            description: None,
            start_time: "25:00".into(),
            end_time: "26:00".into(),
            date_key: day(),
            emoji: None,
            color_tag: None,
        },
    ];

    let outcomes = h.coordinator.import_tasks(&tasks).await;
    assert_eq!(outcomes.len(), 2);
    assert!(matches!(outcomes[1], Err(DayDialError::InvalidEvent(_))));

    let gym = outcomes[0].as_ref().unwrap().clone();
    assert_eq!(gym.sync_state, SyncState::Local);
    assert!(h.calendar.records().is_empty());
    assert_eq!(fire_times(&h, &gym.id), vec![at(17, 50)]);

    let exported = h.coordinator.export_event(&gym.id).await.unwrap();
    assert_eq!(exported.sync_state, SyncState::SyncedExternal);
    assert_eq!(h.calendar.records()[0].title, "🏋️ Gym");
}

#[tokio::test]
async fn test_completion_is_local_only() {
    let h = harness();
    let event = h.coordinator.add_event(standup()).await.unwrap();
    let before = h.calendar.records();

    let done = h.coordinator.set_completed(&event.id, true).await.unwrap();

    assert!(done.is_completed);
    assert_eq!(h.calendar.records(), before);
    assert_eq!(fire_times(&h, &event.id).len(), 2);
}

#[tokio::test]
async fn test_enable_notifications_reports_denial() {
    let h = harness_with(
        MemoryCalendarStore::with_calendars(&["work"]),
        MemoryScheduler::new(PermissionStatus::NotDetermined).denying_requests(),
        synced_settings(),
    );
    let event = h.coordinator.add_event(standup()).await.unwrap();
    assert!(event.notification_settings.trigger_ids.is_empty());

    let err = h.coordinator.enable_notifications().await.unwrap_err();
    assert!(matches!(err, DayDialError::NotAuthorized(Permission::Notifications)));
}

#[tokio::test]
async fn test_enable_notifications_schedules_upcoming_events() {
    let h = harness_with(
        MemoryCalendarStore::with_calendars(&["work"]),
        MemoryScheduler::new(PermissionStatus::NotDetermined),
        synced_settings(),
    );
    let event = h.coordinator.add_event(standup()).await.unwrap();
    assert!(fire_times(&h, &event.id).is_empty());

    let scheduled = h.coordinator.enable_notifications().await.unwrap();

    assert_eq!(scheduled, 2);
    assert_eq!(h.scheduler.permission().await, PermissionStatus::Granted);
    assert_eq!(fire_times(&h, &event.id), vec![at(8, 45), at(8, 55)]);
}

#[tokio::test]
async fn test_calendar_access_is_requested_once() {
    let calendar = MemoryCalendarStore::new(AuthorizationStatus::NotDetermined);
    calendar.answer_prompt_with(AuthorizationStatus::Denied);
    let h = harness_with(calendar, MemoryScheduler::granted(), synced_settings());

    assert!(!h.coordinator.adapter().request_access().await.unwrap());
    assert!(!h.coordinator.adapter().request_access().await.unwrap());
    assert_eq!(h.calendar.prompt_count(), 1);

    // Local work goes on without the calendar.
    let event = h.coordinator.add_event(standup()).await.unwrap();
    assert_eq!(event.sync_state, SyncState::PendingPush);
    let err = h.coordinator.reconcile(DateRange::single(day())).await.unwrap_err();
    assert!(matches!(err, DayDialError::NotAuthorized(Permission::Calendar)));
}

#[tokio::test]
async fn test_watch_reconciles_on_external_change() {
    let h = harness();
    let mut changes = h.coordinator.bus().subscribe();
    let watcher = tokio::spawn(h.coordinator.clone().watch_external_changes());
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }

    h.calendar.insert_external(record("work", "Lunch", at(12, 0), at(13, 0)));

    let change = tokio::time::timeout(std::time::Duration::from_secs(5), changes.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(change.date_key, day());
    assert_eq!(h.coordinator.events_on(day()).unwrap().len(), 1);

    watcher.abort();
}
