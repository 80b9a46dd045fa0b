pub mod add;
pub mod calendars;
pub mod connect;
pub mod done;
pub mod edit;
pub mod import;
pub mod list;
pub mod notifications;
pub mod push;
pub mod remove;
pub mod sync;
pub mod watch;

use anyhow::{Context as _, Result};
use daydial_core::date_key::DateKey;
use daydial_core::event::Event;
use daydial_core::import::parse_clock;

use crate::context::Context;

/// Default event length when neither --end nor --duration is given.
const DEFAULT_DURATION_HOURS: f64 = 1.0;

/// Parse a day argument: `today`, `tomorrow`, `yesterday` or `YYYY-MM-DD`.
pub fn parse_day(input: &str, today: DateKey) -> Result<DateKey> {
    match input.trim().to_lowercase().as_str() {
        "today" => Ok(today),
        "tomorrow" => Ok(today.add_days(1)),
        "yesterday" => Ok(today.add_days(-1)),
        other => Ok(DateKey::parse(other)?),
    }
}

/// Resolve the end hour from `--end HH:MM` or `--duration` (e.g. "45m", "1h30m").
///
/// `00:00` as an end means midnight at the end of the day. Durations that
/// run past midnight end the event at 24:00.
pub fn parse_end(start_hour: f64, end: Option<&str>, duration: Option<&str>) -> Result<f64> {
    if let Some(end) = end {
        let end_hour = parse_clock(end)?;
        if end_hour == 0.0 && start_hour > 0.0 {
            return Ok(24.0);
        }
        return Ok(end_hour);
    }

    let hours = match duration {
        Some(input) => {
            let duration = humantime::parse_duration(input)
                .with_context(|| format!("Could not parse duration: \"{}\"", input))?;
            duration.as_secs_f64() / 3600.0
        }
        None => DEFAULT_DURATION_HOURS,
    };
    Ok((start_hour + hours).min(24.0))
}

/// Look up an event by id, with a helpful error when it does not exist.
pub fn require_event(ctx: &Context, id: &str) -> Result<Event> {
    match ctx.coordinator.event(id)? {
        Some(event) => Ok(event),
        None => anyhow::bail!("No event with id '{}'. Run `daydial list` to see ids.", id),
    }
}
