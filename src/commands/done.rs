use anyhow::Result;
use owo_colors::OwoColorize;

use super::require_event;
use crate::context::Context;

pub async fn run(ctx: &Context, id: &str, undo: bool) -> Result<()> {
    require_event(ctx, id)?;
    let event = ctx.coordinator.set_completed(id, !undo).await?;

    if event.is_completed {
        println!("{} {}", "Done".green(), event.display_title().strikethrough());
    } else {
        println!("{} {}", "Reopened".yellow(), event.display_title());
    }
    Ok(())
}
