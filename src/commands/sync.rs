use anyhow::Result;
use daydial_core::date_range::DateRange;

use crate::context::Context;
use crate::render::Render;
use crate::utils::tui;

pub async fn run(ctx: &Context, range: DateRange) -> Result<()> {
    if !ctx.coordinator.settings().calendar_sync_enabled {
        anyhow::bail!(
            "Calendar sync is off.\n\n\
            Pick the calendars to sync with:\n  \
            daydial connect"
        );
    }

    let spinner = tui::create_spinner(format!("Syncing {} to {}", range.from, range.to));
    let result = ctx.coordinator.reconcile(range).await;
    spinner.finish_and_clear();

    println!("{}", result?.render());
    Ok(())
}
