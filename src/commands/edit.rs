use anyhow::Result;
use daydial_core::event::NotificationSettings;
use daydial_core::import::parse_clock;
use owo_colors::OwoColorize;

use super::{parse_day, parse_end, require_event};
use crate::context::Context;
use crate::render::Render;

/// Fields to change; `None` keeps the current value.
pub struct EventChanges {
    pub title: Option<String>,
    pub date: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub duration: Option<String>,
    pub emoji: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub remind: Option<Vec<u32>>,
    pub no_remind: bool,
}

pub async fn run(ctx: &Context, id: &str, changes: EventChanges) -> Result<()> {
    let mut event = require_event(ctx, id)?;

    if let Some(title) = changes.title {
        event.title = title;
    }
    if let Some(date) = &changes.date {
        event.date_key = parse_day(date, ctx.today())?;
    }

    // A new start keeps the length unless a new end is given too.
    let length = event.duration();
    if let Some(start) = &changes.start {
        event.start_hour = parse_clock(start)?;
    }
    if changes.end.is_some() || changes.duration.is_some() {
        event.end_hour = parse_end(event.start_hour, changes.end.as_deref(), changes.duration.as_deref())?;
    } else if changes.start.is_some() {
        event.end_hour = (event.start_hour + length).min(24.0);
    }

    if let Some(emoji) = changes.emoji {
        event.emoji = emoji;
    }
    if let Some(description) = changes.description {
        event.description = Some(description).filter(|d| !d.is_empty());
    }
    if let Some(color) = changes.color {
        event.color_tag = color;
    }
    if changes.no_remind {
        event.notification_settings = NotificationSettings::disabled();
    } else if let Some(remind) = changes.remind {
        event.notification_settings = NotificationSettings::with_minutes(remind);
    }

    let event = ctx.coordinator.update_event(event).await?;

    println!("{} {}", "Updated".yellow(), event.date_key.to_string().bold());
    println!("{}", event.render());
    Ok(())
}
