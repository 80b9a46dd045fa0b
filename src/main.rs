mod commands;
mod context;
mod render;
mod utils;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use daydial_core::date_range::DateRange;
use tracing_subscriber::EnvFilter;

use crate::commands::add::NewEvent;
use crate::commands::edit::EventChanges;
use crate::context::Context;

#[derive(Parser)]
#[command(name = "daydial")]
#[command(about = "Plan your day, get reminded, and keep it in sync with your calendars")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add an event
    Add {
        title: String,

        /// Day of the event (YYYY-MM-DD, "today", "tomorrow")
        #[arg(long)]
        date: Option<String>,

        /// Start time (HH:MM)
        #[arg(short, long)]
        start: String,

        /// End time (HH:MM)
        #[arg(short, long, conflicts_with = "duration")]
        end: Option<String>,

        /// Duration (e.g., "30m", "1h", "2h30m")
        #[arg(short, long, conflicts_with = "end")]
        duration: Option<String>,

        #[arg(long)]
        emoji: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        color: Option<String>,

        /// Reminders, in minutes before the start (e.g., "15,5"); defaults to the configured ones
        #[arg(short, long, value_delimiter = ',')]
        remind: Vec<u32>,
    },
    /// Change an event
    Edit {
        id: String,

        #[arg(long)]
        title: Option<String>,

        /// Move to another day (YYYY-MM-DD, "today", "tomorrow")
        #[arg(long)]
        date: Option<String>,

        /// New start time (HH:MM); keeps the length unless --end or --duration is given
        #[arg(short, long)]
        start: Option<String>,

        #[arg(short, long, conflicts_with = "duration")]
        end: Option<String>,

        #[arg(short, long, conflicts_with = "end")]
        duration: Option<String>,

        #[arg(long)]
        emoji: Option<String>,

        /// New description ("" clears it)
        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        color: Option<String>,

        /// Replace the reminders (minutes before the start, e.g., "15,5")
        #[arg(short, long, value_delimiter = ',', conflicts_with = "no_remind")]
        remind: Option<Vec<u32>>,

        /// Turn reminders off
        #[arg(long)]
        no_remind: bool,
    },
    /// Remove an event, its reminders and its calendar copy
    Remove { id: String },
    /// Mark an event as done
    Done {
        id: String,

        /// Mark it as not done again
        #[arg(long)]
        undo: bool,
    },
    /// List events
    List {
        /// First day (YYYY-MM-DD, "today", "tomorrow"); defaults to today
        #[arg(long)]
        from: Option<String>,

        /// Last day (YYYY-MM-DD, "today", "tomorrow"); defaults to the first day
        #[arg(long)]
        to: Option<String>,

        /// Night-owl order: events before 06:00 are listed after the evening
        #[arg(long)]
        night: bool,
    },
    /// Sync events with your calendars
    Sync {
        /// First day (YYYY-MM-DD); defaults to yesterday
        #[arg(long)]
        from: Option<String>,

        /// Last day (YYYY-MM-DD); defaults to two weeks ahead
        #[arg(long)]
        to: Option<String>,
    },
    /// Show calendars and which ones are synced
    Calendars,
    /// Grant calendar access and pick the calendars to sync with
    Connect {
        /// Create a new calendar with this name first
        #[arg(long)]
        create: Option<String>,

        /// Ask for calendar access again after a denial
        #[arg(long)]
        reset_access: bool,
    },
    /// Import tasks from a JSON file produced by the AI planner
    Import { file: PathBuf },
    /// Turn reminders on
    Notifications {
        /// Ask for permission again after a denial
        #[arg(long)]
        reset: bool,
    },
    /// Add an event to your calendar
    Push { id: String },
    /// Deliver reminders and follow calendar changes until stopped
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut ctx = Context::load()?;

    match cli.command {
        Commands::Add {
            title,
            date,
            start,
            end,
            duration,
            emoji,
            description,
            color,
            remind,
        } => {
            let new = NewEvent {
                title,
                date,
                start,
                end,
                duration,
                emoji,
                description,
                color,
                remind,
            };
            commands::add::run(&ctx, new).await?
        }
        Commands::Edit {
            id,
            title,
            date,
            start,
            end,
            duration,
            emoji,
            description,
            color,
            remind,
            no_remind,
        } => {
            let changes = EventChanges {
                title,
                date,
                start,
                end,
                duration,
                emoji,
                description,
                color,
                remind,
                no_remind,
            };
            commands::edit::run(&ctx, &id, changes).await?
        }
        Commands::Remove { id } => commands::remove::run(&ctx, &id).await?,
        Commands::Done { id, undo } => commands::done::run(&ctx, &id, undo).await?,
        Commands::List { from, to, night } => {
            let range = parse_range(&ctx, from, to, DateRange::single(ctx.today()))?;
            commands::list::run(&ctx, range, night)?
        }
        Commands::Sync { from, to } => {
            let window = ctx.coordinator.settings().window(ctx.today());
            let range = parse_range(&ctx, from, to, window)?;
            commands::sync::run(&ctx, range).await?
        }
        Commands::Calendars => commands::calendars::run(&ctx).await?,
        Commands::Connect { create, reset_access } => commands::connect::run(&mut ctx, create, reset_access).await?,
        Commands::Import { file } => commands::import::run(&ctx, &file).await?,
        Commands::Notifications { reset } => commands::notifications::run(&ctx, reset).await?,
        Commands::Push { id } => commands::push::run(&ctx, &id).await?,
        Commands::Watch => commands::watch::run(&mut ctx).await?,
    }

    ctx.refresh_widgets()
}

/// `--from`/`--to` as a range; a missing end comes from `default`.
fn parse_range(ctx: &Context, from: Option<String>, to: Option<String>, default: DateRange) -> Result<DateRange> {
    let today = ctx.today();
    let from = match from {
        Some(day) => commands::parse_day(&day, today)?,
        None => default.from,
    };
    let to = match to {
        Some(day) => commands::parse_day(&day, today)?,
        None => default.to.max(from),
    };
    Ok(DateRange::new(from, to)?)
}

/// Logs go to stderr, filtered by `DAYDIAL_LOG` (e.g. `DAYDIAL_LOG=daydial_core=debug`).
fn init_tracing() {
    let filter = EnvFilter::try_from_env("DAYDIAL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
