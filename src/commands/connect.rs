use anyhow::Result;
use daydial_core::calendar::AuthorizationStatus;
use dialoguer::{MultiSelect, Select};
use owo_colors::OwoColorize;

use crate::context::Context;
use crate::render::Render;
use crate::utils::tui;

pub async fn run(ctx: &mut Context, create: Option<String>, reset_access: bool) -> Result<()> {
    let coordinator = ctx.coordinator.clone();
    let adapter = coordinator.adapter();

    if reset_access {
        ctx.calendar.set_authorization(AuthorizationStatus::NotDetermined)?;
    }

    if !adapter.request_access().await? {
        anyhow::bail!(
            "Calendar access was denied.\n\n\
            Ask again with:\n  \
            daydial connect --reset-access"
        );
    }

    if let Some(name) = create {
        let source = ctx.calendar.create_calendar(&name, "blue", true)?;
        println!("  {}/ (created)", source.id);
    }

    let sources = adapter.all_sources().await?;
    let writable = adapter.list_sources().await?;
    if writable.is_empty() {
        anyhow::bail!(
            "No writable calendars in {}.\n\n\
            Create one with:\n  \
            daydial connect --create personal",
            ctx.config.calendar_dir.display()
        );
    }

    let settings = coordinator.settings();

    // Target calendar for new events
    let items: Vec<String> = writable.iter().map(|s| s.render()).collect();
    let current = writable
        .iter()
        .position(|s| settings.target_calendar_id.as_deref() == Some(s.id.as_str()))
        .unwrap_or(0);
    let target = Select::new()
        .with_prompt("Calendar for new events")
        .items(&items)
        .default(current)
        .interact()?;
    let target_id = writable[target].id.clone();

    // Calendars to import from
    let items: Vec<String> = sources.iter().map(|s| s.render()).collect();
    let defaults: Vec<bool> = sources
        .iter()
        .map(|s| settings.selected_calendar_ids.is_empty() || settings.selected_calendar_ids.contains(&s.id))
        .collect();
    let selections = MultiSelect::new()
        .with_prompt("Select calendars to import (space to toggle, enter to confirm)")
        .items(&items)
        .defaults(&defaults)
        .interact()?;
    let selected: Vec<String> = selections.iter().map(|&i| sources[i].id.clone()).collect();

    coordinator.update_settings(|s| {
        s.calendar_sync_enabled = true;
        s.target_calendar_id = Some(target_id.clone());
    });
    let purged = coordinator.set_selected_calendars(selected).await?;
    ctx.save_sync_settings()?;

    println!("\n{} new events go to {}", "Connected:".green(), target_id.bold());
    if purged > 0 {
        println!("Removed {} events of calendars no longer imported", purged);
    }

    let range = coordinator.settings().window(ctx.today());
    let spinner = tui::create_spinner("Syncing".to_string());
    let result = coordinator.reconcile(range).await;
    spinner.finish_and_clear();
    println!("{}", result?.render());

    Ok(())
}
