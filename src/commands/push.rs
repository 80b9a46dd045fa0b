use anyhow::Result;
use owo_colors::OwoColorize;

use super::require_event;
use crate::context::Context;
use crate::utils::tui;

pub async fn run(ctx: &Context, id: &str) -> Result<()> {
    let event = require_event(ctx, id)?;
    let Some(target) = ctx.coordinator.settings().target_calendar_id else {
        anyhow::bail!("No target calendar yet. Run `daydial connect` first.");
    };

    let spinner = tui::create_spinner(format!("Pushing {} to {}", event.display_title(), target));
    let result = ctx.coordinator.export_event(id).await;
    spinner.finish_and_clear();

    let event = result?;
    println!(
        "{} {} to {}",
        "Pushed".green(),
        event.display_title(),
        event.external_calendar_id.as_deref().unwrap_or(&target).bold()
    );
    Ok(())
}
