//! Reminder triggers derived from events.

mod handle;
mod json_file;
mod manager;
mod scheduler;
mod trigger;

pub use handle::TriggerHandle;
pub use json_file::{JsonFileScheduler, PermissionPrompt};
pub use manager::TriggerManager;
pub use scheduler::{MemoryScheduler, NotificationScheduler, PermissionStatus};
pub use trigger::{NotificationTrigger, TriggerPayload};
