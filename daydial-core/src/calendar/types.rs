use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Calendar access granted by the user.
///
/// Only `request_access` moves out of `NotDetermined`; everything else is
/// changed by the user in system settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    #[default]
    NotDetermined,
    FullAccess,
    WriteOnly,
    Denied,
    Restricted,
}

impl AuthorizationStatus {
    pub fn can_read(&self) -> bool {
        matches!(self, AuthorizationStatus::FullAccess)
    }

    pub fn can_write(&self) -> bool {
        matches!(self, AuthorizationStatus::FullAccess | AuthorizationStatus::WriteOnly)
    }
}

/// A calendar the user can pick for import or two-way sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarSource {
    pub id: String,
    pub display_name: String,
    pub color_tag: String,
    /// Read-only calendars are import-only.
    pub writable: bool,
}

/// An event as the external calendar stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalRecord {
    pub id: String,
    pub calendar_id: String,
    pub title: String,
    pub notes: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Alarm offsets in minutes relative to `start`; negative is before.
    pub alarms: Vec<i64>,
    pub last_modified: DateTime<Utc>,
}
