use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use owo_colors::OwoColorize;
use tracing::warn;

use crate::context::Context;
use crate::render::{Render, render_trigger};

const DELIVERY_TICK: Duration = Duration::from_secs(1);

/// Deliver due reminders and follow outside calendar edits until Ctrl-C.
pub async fn run(ctx: &mut Context) -> Result<()> {
    let sync_enabled = ctx.coordinator.settings().calendar_sync_enabled;

    let (poller, watcher) = if sync_enabled {
        match ctx.coordinator.on_external_change().await {
            Ok(report) if !report.is_empty() => println!("{}", report.render()),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "initial sync failed"),
        }
        (
            Some(ctx.calendar.watch(ctx.config.poll_interval())),
            Some(tokio::spawn(ctx.coordinator.clone().watch_external_changes())),
        )
    } else {
        (None, None)
    };

    println!("{}", "Watching for reminders. Press Ctrl-C to stop.".dimmed());

    let tz = ctx.tz();
    let mut ticker = tokio::time::interval(DELIVERY_TICK);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for trigger in ctx.scheduler.take_due(Utc::now())? {
                    println!("{}", render_trigger(&trigger, tz));
                }
                ctx.refresh_widgets()?;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    for task in [poller, watcher].into_iter().flatten() {
        task.abort();
    }
    Ok(())
}
