use anyhow::Result;
use daydial_core::event::Event;
use daydial_core::import::parse_clock;
use owo_colors::OwoColorize;

use super::{parse_day, parse_end};
use crate::context::Context;
use crate::render::Render;

pub struct NewEvent {
    pub title: String,
    pub date: Option<String>,
    pub start: String,
    pub end: Option<String>,
    pub duration: Option<String>,
    pub emoji: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub remind: Vec<u32>,
}

pub async fn run(ctx: &Context, new: NewEvent) -> Result<()> {
    let today = ctx.today();
    let date_key = match &new.date {
        Some(date) => parse_day(date, today)?,
        None => today,
    };
    let start_hour = parse_clock(&new.start)?;
    let end_hour = parse_end(start_hour, new.end.as_deref(), new.duration.as_deref())?;

    let remind = if new.remind.is_empty() {
        ctx.config.notifications.default_minutes_before.clone()
    } else {
        new.remind
    };
    let mut event = Event::new(new.title, date_key, start_hour, end_hour).with_reminders(remind);
    if let Some(emoji) = new.emoji {
        event = event.with_emoji(emoji);
    }
    if let Some(description) = new.description {
        event = event.with_description(description);
    }
    if let Some(color) = new.color {
        event = event.with_color(color);
    }

    let event = ctx.coordinator.add_event(event).await?;

    println!("{} {}", "Added".green(), event.date_key.to_string().bold());
    println!("{}", event.render());
    Ok(())
}
