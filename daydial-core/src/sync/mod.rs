//! Keeps local events, reminders and the external calendar consistent.

mod coordinator;
mod locks;
mod report;
mod settings;

pub use coordinator::SyncCoordinator;
pub use locks::{EventLocks, ReconcileGate};
pub use report::ReconcileReport;
pub use settings::SyncSettings;
