//! Which way each event has to travel to bring local and external copies
//! back in line.

use std::collections::{HashMap, HashSet};

use crate::diff::{DiffKind, EventDiff};
use crate::event::{Event, SyncState};

/// Changes for one reconcile pass over a set of fetched calendars.
#[derive(Debug, Default)]
pub struct ReconcilePlan {
    /// Local copies that lose to (or are missing) the external copy.
    pub to_pull: Vec<EventDiff>,
    /// External records that lose to the local copy.
    pub to_push: Vec<EventDiff>,
    /// Pending-pull events whose content already matches; only the state
    /// needs to go back to synced.
    pub settled: Vec<Event>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.to_pull.is_empty() && self.to_push.is_empty() && self.settled.is_empty()
    }

    /// Plan a reconcile.
    ///
    /// `local` holds every local event linked to a record of
    /// `fetched_calendars`; `external` holds the converted external events
    /// that were fetched. Local events of other calendars are never touched.
    pub fn from_events(local: Vec<Event>, external: Vec<Event>, fetched_calendars: &[String]) -> Self {
        let fetched: HashSet<&str> = fetched_calendars.iter().map(String::as_str).collect();

        let mut local = local;
        local.sort_by(|a, b| a.last_modified.cmp(&b.last_modified).then_with(|| a.id.cmp(&b.id)));

        let mut plan = ReconcilePlan::default();

        // One local copy per record: the oldest stays, extra copies go.
        let mut local_by_key: HashMap<String, Event> = HashMap::new();
        for event in local {
            if !event
                .external_calendar_id
                .as_deref()
                .is_some_and(|c| fetched.contains(c))
            {
                continue;
            }
            let Some(key) = event.external_event_id.clone() else {
                continue;
            };
            match local_by_key.get(&key) {
                Some(kept) if kept.id != event.id => {
                    plan.to_pull.extend(EventDiff::get_diff(Some(event), None));
                }
                Some(_) => {}
                None => {
                    local_by_key.insert(key, event);
                }
            }
        }

        let external_by_key: HashMap<String, Event> = external
            .into_iter()
            .filter_map(|e| e.external_event_id.clone().map(|id| (id, e)))
            .collect();

        // Local events gone from the external calendar
        for (key, local) in &local_by_key {
            if external_by_key.contains_key(key) {
                continue;
            }
            // Pending pushes keep their local edit; the push retry handles them.
            if matches!(local.sync_state, SyncState::SyncedExternal | SyncState::PendingPull) {
                plan.to_pull.extend(EventDiff::get_diff(Some(local.clone()), None));
            }
        }

        // External events not known locally
        for (key, external) in &external_by_key {
            if !local_by_key.contains_key(key) {
                plan.to_pull.extend(EventDiff::get_diff(None, Some(external.clone())));
            }
        }

        // Events on both sides
        for (key, local) in &local_by_key {
            let Some(external) = external_by_key.get(key) else {
                continue;
            };

            match local.sync_state {
                SyncState::PendingPush | SyncState::Local => continue,
                SyncState::PendingPull => {
                    let merged = merge_external(local, external);
                    if local.same_content(external) {
                        plan.settled.push(merged);
                    } else {
                        plan.to_pull.extend(EventDiff::get_diff(Some(local.clone()), Some(merged)));
                    }
                }
                SyncState::SyncedExternal => {
                    if local.same_content(external) {
                        continue;
                    }
                    // Newer copy wins; on a tie the external copy wins.
                    if local.last_modified > external.last_modified {
                        plan.to_push
                            .extend(EventDiff::get_diff(Some(external.clone()), Some(local.clone())));
                    } else {
                        let merged = merge_external(local, external);
                        plan.to_pull.extend(EventDiff::get_diff(Some(local.clone()), Some(merged)));
                    }
                }
            }
        }

        // Sort by day and start hour (ascending)
        let sort_key = |d: &EventDiff| {
            d.event()
                .map(|e| (e.date_key, (e.start_hour * 3600.0) as i64, e.id.clone()))
        };
        plan.to_pull.sort_by_key(sort_key);
        plan.to_push.sort_by_key(sort_key);

        plan
    }

    /// (created, updated, deleted) on the local side.
    pub fn pull_counts(&self) -> (usize, usize, usize) {
        count_by_kind(&self.to_pull)
    }
}

fn count_by_kind(diffs: &[EventDiff]) -> (usize, usize, usize) {
    let mut created = 0;
    let mut updated = 0;
    let mut deleted = 0;

    for diff in diffs {
        match diff.kind {
            DiffKind::Create => created += 1,
            DiffKind::Update => updated += 1,
            DiffKind::Delete => deleted += 1,
        }
    }

    (created, updated, deleted)
}

/// The external copy under the local identity.
///
/// Keeps what only exists locally: id, completion, color and, when the
/// reminders in force agree, the local notification settings.
pub fn merge_external(local: &Event, external: &Event) -> Event {
    let mut merged = external.clone();
    merged.id = local.id.clone();
    merged.is_completed = local.is_completed;
    merged.color_tag = local.color_tag.clone();
    merged.is_from_calendar = local.is_from_calendar;
    if local.effective_reminders() == external.effective_reminders() {
        merged.notification_settings = local.notification_settings.clone();
    } else {
        merged.notification_settings.trigger_ids = local.notification_settings.trigger_ids.clone();
    }
    merged.sync_state = SyncState::SyncedExternal;
    merged
}
