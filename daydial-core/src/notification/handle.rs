use std::fmt;

use serde::{Deserialize, Serialize};

/// Cancellable reference to a scheduled reminder.
///
/// Derived purely from `(event_id, minutes_before)` so a reschedule can find
/// the reminders of an event without keeping a separate index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerHandle(String);

impl TriggerHandle {
    pub fn derive(event_id: &str, minutes_before: u32) -> Self {
        TriggerHandle(format!("{}#{}m", event_id, minutes_before))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split the handle back into its event id and reminder offset.
    pub fn parts(&self) -> Option<(&str, u32)> {
        let (event_id, offset) = self.0.rsplit_once('#')?;
        let minutes = offset.strip_suffix('m')?.parse().ok()?;
        Some((event_id, minutes))
    }

    pub fn event_id(&self) -> Option<&str> {
        self.parts().map(|(id, _)| id)
    }
}

impl fmt::Display for TriggerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
