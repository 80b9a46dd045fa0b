use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::Event;
use crate::notification::TriggerHandle;

/// What the delivery layer shows when a reminder fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerPayload {
    pub event_id: String,
    pub title: String,
    pub body: String,
}

impl TriggerPayload {
    pub fn for_event(event: &Event, minutes_before: u32) -> Self {
        let lead = match minutes_before {
            0 => "Starting now".to_string(),
            1 => "Starts in 1 minute".to_string(),
            m => format!("Starts in {} minutes", m),
        };
        TriggerPayload {
            event_id: event.id.clone(),
            title: event.display_title(),
            body: format!("{} · {}", lead, event.time_range_string()),
        }
    }
}

/// A reminder scheduled at an absolute instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationTrigger {
    pub handle: TriggerHandle,
    pub event_id: String,
    pub fires_at: DateTime<Utc>,
    pub minutes_before: u32,
    pub payload: TriggerPayload,
}
