use anyhow::Result;
use owo_colors::OwoColorize;

use crate::context::Context;

pub async fn run(ctx: &Context, id: &str) -> Result<()> {
    match ctx.coordinator.delete_event(id).await? {
        Some(event) => println!("{} {}", "Removed".red(), event.display_title()),
        None => anyhow::bail!("No event with id '{}'. Run `daydial list` to see ids.", id),
    }
    Ok(())
}
