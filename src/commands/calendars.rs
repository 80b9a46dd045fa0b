use anyhow::Result;
use owo_colors::OwoColorize;

use crate::context::Context;
use crate::render::Render;

pub async fn run(ctx: &Context) -> Result<()> {
    let adapter = ctx.coordinator.adapter();
    let status = adapter.authorization().await;
    println!("Calendar access: {}", status.render());

    if !status.can_read() && !status.can_write() {
        println!("\nRun `daydial connect` to grant access.");
        return Ok(());
    }

    let settings = ctx.coordinator.settings();
    let sources = adapter.all_sources().await?;
    if sources.is_empty() {
        println!(
            "\n{} in {}. Create one with `daydial connect --create <name>`.",
            "No calendars".yellow(),
            ctx.config.calendar_dir.display()
        );
        return Ok(());
    }

    println!();
    for source in &sources {
        let mut tags = Vec::new();
        if settings.target_calendar_id.as_deref() == Some(source.id.as_str()) {
            tags.push("target".green().to_string());
        }
        if settings.selected_calendar_ids.contains(&source.id) {
            tags.push("imported".cyan().to_string());
        }
        let tags = if tags.is_empty() {
            String::new()
        } else {
            format!(" {}", tags.join(" "))
        };
        println!("{}{}", source.render(), tags);
    }

    if !settings.calendar_sync_enabled {
        println!("\n{}", "Sync is off.".dimmed());
    }
    Ok(())
}
