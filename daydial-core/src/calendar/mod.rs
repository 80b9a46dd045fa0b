//! The external calendar boundary.
//!
//! `CalendarStore` is the port to whatever actually holds the user's
//! calendars; `CalendarAdapter` adds the authorization rules and the
//! translation to and from local events.

mod adapter;
pub mod convert;
mod ics_dir;
mod memory;
mod store;
mod types;

pub use adapter::CalendarAdapter;
pub use ics_dir::{AccessPrompt, CalendarDirConfig, IcsDirStore};
pub use memory::MemoryCalendarStore;
pub use store::CalendarStore;
pub use types::{AuthorizationStatus, CalendarSource, ExternalRecord};
