/// Triggers must fire at least this far in the future to be scheduled.
pub const TRIGGER_SAFETY_MARGIN_SECS: i64 = 5;

/// Days before today covered by an external-change reconcile.
pub const DEFAULT_WINDOW_PAST_DAYS: i64 = 1;

/// Days after today covered by an external-change reconcile.
pub const DEFAULT_WINDOW_FUTURE_DAYS: i64 = 14;

/// Emoji used for events whose title has no leading emoji.
pub const DEFAULT_CALENDAR_GLYPH: &str = "📅";

/// Default reminder offsets for new events.
pub const DEFAULT_MINUTES_BEFORE: &[u32] = &[10];

/// How often the calendar directory is polled for outside changes.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;
