//! Notification scheduler port and its in-memory implementation.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DayDialResult;
use crate::notification::{NotificationTrigger, TriggerHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    #[default]
    NotDetermined,
    Granted,
    Denied,
}

/// The platform facility that fires reminders at a given instant.
///
/// Adding a trigger whose handle is already pending replaces it. Removing an
/// unknown handle is a no-op.
#[async_trait]
pub trait NotificationScheduler: Send + Sync {
    /// Current permission. May change outside the app at any time.
    async fn permission(&self) -> PermissionStatus;

    /// One-shot permission prompt.
    async fn request_permission(&self) -> DayDialResult<bool>;

    async fn add(&self, trigger: NotificationTrigger) -> DayDialResult<()>;

    async fn remove(&self, handles: &[TriggerHandle]) -> DayDialResult<()>;

    async fn pending(&self) -> DayDialResult<Vec<NotificationTrigger>>;
}

/// Scheduler that keeps pending triggers in memory.
pub struct MemoryScheduler {
    permission: Mutex<PermissionStatus>,
    grant_on_request: bool,
    pending: Mutex<BTreeMap<TriggerHandle, NotificationTrigger>>,
}

impl MemoryScheduler {
    pub fn new(permission: PermissionStatus) -> Self {
        MemoryScheduler {
            permission: Mutex::new(permission),
            grant_on_request: true,
            pending: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn granted() -> Self {
        Self::new(PermissionStatus::Granted)
    }

    /// Answer "no" when the permission prompt is shown.
    pub fn denying_requests(mut self) -> Self {
        self.grant_on_request = false;
        self
    }

    /// Simulate the user changing the permission in system settings.
    pub fn set_permission(&self, status: PermissionStatus) {
        *self.permission.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }

    pub fn pending_for(&self, event_id: &str) -> Vec<NotificationTrigger> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|t| t.event_id == event_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl NotificationScheduler for MemoryScheduler {
    async fn permission(&self) -> PermissionStatus {
        *self.permission.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn request_permission(&self) -> DayDialResult<bool> {
        let mut permission = self.permission.lock().unwrap_or_else(|e| e.into_inner());
        if *permission == PermissionStatus::NotDetermined {
            *permission = if self.grant_on_request {
                PermissionStatus::Granted
            } else {
                PermissionStatus::Denied
            };
        }
        Ok(*permission == PermissionStatus::Granted)
    }

    async fn add(&self, trigger: NotificationTrigger) -> DayDialResult<()> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(trigger.handle.clone(), trigger);
        Ok(())
    }

    async fn remove(&self, handles: &[TriggerHandle]) -> DayDialResult<()> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        for handle in handles {
            pending.remove(handle);
        }
        Ok(())
    }

    async fn pending(&self) -> DayDialResult<Vec<NotificationTrigger>> {
        Ok(self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect())
    }
}
