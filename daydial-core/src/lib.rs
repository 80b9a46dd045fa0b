//! Core of daydial: events planned on a day, their reminders, and two-way
//! sync with an external calendar.
//!
//! - `event` holds the `Event` record every other module works on
//! - `notification` turns reminder offsets into scheduled triggers
//! - `calendar` is the boundary to the external calendar store
//! - `sync` owns the local copy and keeps the other two consistent with it

pub mod bus;
pub mod calendar;
pub mod clock;
pub mod config;
pub mod constants;
pub mod date_key;
pub mod date_range;
pub mod diff;
pub mod error;
pub mod event;
pub mod ics;
pub mod import;
pub mod notification;
pub mod store;
pub mod sync;
pub mod utils;
pub mod widget;

pub use error::{DayDialError, DayDialResult};
pub use event::{Event, NotificationSettings, SyncState};
