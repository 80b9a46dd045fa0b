//! Diff types for reconciling local events with the external calendar.

mod diff_kind;
mod event_diff;
mod reconcile_plan;

pub use diff_kind::DiffKind;
pub use event_diff::EventDiff;
pub use reconcile_plan::{ReconcilePlan, merge_external};
