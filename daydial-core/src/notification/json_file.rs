//! File-backed scheduler used by the CLI.
//!
//! Pending reminders live in a JSON file; `take_due` hands the ones whose time
//! has come to the delivery loop and forgets them.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DayDialResult;
use crate::notification::{NotificationScheduler, NotificationTrigger, PermissionStatus, TriggerHandle};
use crate::utils::write_atomic;

pub type PermissionPrompt = Box<dyn Fn() -> bool + Send + Sync>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct SchedulerState {
    #[serde(default)]
    permission: PermissionStatus,
    #[serde(default)]
    pending: Vec<NotificationTrigger>,
}

pub struct JsonFileScheduler {
    path: PathBuf,
    prompt: PermissionPrompt,
    lock: Mutex<()>,
}

impl JsonFileScheduler {
    pub fn new(path: PathBuf, prompt: PermissionPrompt) -> Self {
        JsonFileScheduler {
            path,
            prompt,
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> DayDialResult<SchedulerState> {
        if !self.path.exists() {
            return Ok(SchedulerState::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, state: &SchedulerState) -> DayDialResult<()> {
        let content = serde_json::to_string_pretty(state)?;
        write_atomic(&self.path, &content)
    }

    fn update<T>(&self, f: impl FnOnce(&mut SchedulerState) -> T) -> DayDialResult<T> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut state = self.load()?;
        let out = f(&mut state);
        self.save(&state)?;
        Ok(out)
    }

    /// Remove and return every trigger due at or before `now`, oldest first.
    pub fn take_due(&self, now: DateTime<Utc>) -> DayDialResult<Vec<NotificationTrigger>> {
        self.update(|state| {
            let (mut due, rest): (Vec<_>, Vec<_>) =
                state.pending.drain(..).partition(|t| t.fires_at <= now);
            state.pending = rest;
            due.sort_by_key(|t| t.fires_at);
            due
        })
    }

    /// Forget a previous answer so the prompt is shown again.
    pub fn reset_permission(&self) -> DayDialResult<()> {
        self.update(|state| state.permission = PermissionStatus::NotDetermined)
    }
}

#[async_trait]
impl NotificationScheduler for JsonFileScheduler {
    async fn permission(&self) -> PermissionStatus {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.load().map(|s| s.permission).unwrap_or_default()
    }

    async fn request_permission(&self) -> DayDialResult<bool> {
        let current = self.permission().await;
        if current != PermissionStatus::NotDetermined {
            return Ok(current == PermissionStatus::Granted);
        }
        let granted = (self.prompt)();
        self.update(|state| {
            state.permission = if granted {
                PermissionStatus::Granted
            } else {
                PermissionStatus::Denied
            };
        })?;
        Ok(granted)
    }

    async fn add(&self, trigger: NotificationTrigger) -> DayDialResult<()> {
        self.update(|state| {
            state.pending.retain(|t| t.handle != trigger.handle);
            state.pending.push(trigger);
        })
    }

    async fn remove(&self, handles: &[TriggerHandle]) -> DayDialResult<()> {
        self.update(|state| state.pending.retain(|t| !handles.contains(&t.handle)))
    }

    async fn pending(&self) -> DayDialResult<Vec<NotificationTrigger>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.load()?.pending)
    }
}
