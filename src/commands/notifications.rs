use anyhow::Result;
use daydial_core::error::DayDialError;
use owo_colors::OwoColorize;

use crate::context::Context;

pub async fn run(ctx: &Context, reset: bool) -> Result<()> {
    if reset {
        ctx.scheduler.reset_permission()?;
    }

    match ctx.coordinator.enable_notifications().await {
        Ok(scheduled) => {
            println!("{} {} reminders scheduled", "Reminders on.".green(), scheduled);
            println!("{}", "Run `daydial watch` to have them delivered.".dimmed());
            Ok(())
        }
        Err(DayDialError::NotAuthorized(_)) => anyhow::bail!(
            "Reminders are turned off.\n\n\
            Ask again with:\n  \
            daydial notifications --reset"
        ),
        Err(e) => Err(e.into()),
    }
}
