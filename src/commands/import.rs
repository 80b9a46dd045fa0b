use std::path::Path;

use anyhow::{Context as _, Result};
use daydial_core::import::ImportedTask;
use owo_colors::OwoColorize;

use crate::context::Context;
use crate::render::Render;

pub async fn run(ctx: &Context, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;
    let tasks: Vec<ImportedTask> =
        serde_json::from_str(&content).with_context(|| format!("{} is not a task list", path.display()))?;

    let outcomes = ctx.coordinator.import_tasks(&tasks).await;

    let mut imported = 0;
    for (task, outcome) in tasks.iter().zip(&outcomes) {
        match outcome {
            Ok(event) => {
                imported += 1;
                println!("{} {}", "+".green(), event.render());
            }
            Err(e) => println!("{} {} {}", "!".red(), task.title, e.to_string().red()),
        }
    }

    println!("\nImported {} of {} tasks", imported, tasks.len());
    if imported > 0 && ctx.coordinator.settings().push_target().is_some() {
        println!("{}", "Imported events stay local. Use `daydial push <id>` to add one to your calendar.".dimmed());
    }
    Ok(())
}
