use anyhow::Result;
use chrono::{Timelike, Utc};
use daydial_core::date_range::DateRange;
use daydial_core::widget::WidgetSnapshot;
use owo_colors::OwoColorize;

use crate::context::Context;
use crate::render::{Render, date_label};

pub fn run(ctx: &Context, range: DateRange, night: bool) -> Result<()> {
    let today = ctx.today();
    let mut printed_day = false;

    for day in range.days() {
        let mut events = ctx.coordinator.events_on(day)?;
        if night {
            events.sort_by(|a, b| a.night_view_hours().0.total_cmp(&b.night_view_hours().0));
        }
        if events.is_empty() {
            continue;
        }

        if printed_day {
            println!();
        }
        println!("{} {}", date_label(day, today).bold(), day.to_string().dimmed());
        for event in &events {
            println!("{}", event.render());
        }
        if day == today {
            let now = Utc::now();
            let local = now.with_timezone(&ctx.tz());
            let hour = local.hour() as f64 + local.minute() as f64 / 60.0;
            if let Some(next) = WidgetSnapshot::of_day(day, &events, now).up_next(hour) {
                println!("  {} {} {}", "Up next:".bold(), next.title, next.time_range.dimmed());
            }
        }
        printed_day = true;
    }

    if !printed_day {
        println!("{}", "No events found".dimmed());
    }
    Ok(())
}
