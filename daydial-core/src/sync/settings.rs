use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_WINDOW_FUTURE_DAYS, DEFAULT_WINDOW_PAST_DAYS};
use crate::date_key::DateKey;
use crate::date_range::DateRange;

/// User choices that drive calendar sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    pub calendar_sync_enabled: bool,
    /// Where new events are created.
    pub target_calendar_id: Option<String>,
    /// Calendars imported from.
    pub selected_calendar_ids: Vec<String>,
    pub window_past_days: i64,
    pub window_future_days: i64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            calendar_sync_enabled: false,
            target_calendar_id: None,
            selected_calendar_ids: Vec::new(),
            window_past_days: DEFAULT_WINDOW_PAST_DAYS,
            window_future_days: DEFAULT_WINDOW_FUTURE_DAYS,
        }
    }
}

impl SyncSettings {
    /// The target to push to, if sync is on and one is set.
    pub fn push_target(&self) -> Option<&str> {
        if self.calendar_sync_enabled {
            self.target_calendar_id.as_deref()
        } else {
            None
        }
    }

    /// Selected calendars plus the target, without duplicates.
    pub fn fetched_calendar_ids(&self) -> Vec<String> {
        let mut ids = self.selected_calendar_ids.clone();
        if let Some(target) = &self.target_calendar_id {
            if !ids.contains(target) {
                ids.push(target.clone());
            }
        }
        ids
    }

    /// The window reconciled after an external change.
    pub fn window(&self, today: DateKey) -> DateRange {
        DateRange::around(today, self.window_past_days, self.window_future_days)
    }
}
