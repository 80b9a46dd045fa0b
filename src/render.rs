//! TUI rendering traits for daydial types.
//!
//! Extension traits that add colored terminal rendering to daydial-core
//! types using owo_colors.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use daydial_core::calendar::{AuthorizationStatus, CalendarSource};
use daydial_core::date_key::DateKey;
use daydial_core::event::{Event, SyncState};
use daydial_core::notification::NotificationTrigger;
use daydial_core::sync::ReconcileReport;
use owo_colors::OwoColorize;

/// Extension trait for TUI rendering with colors.
pub trait Render {
    fn render(&self) -> String;
}

impl Render for SyncState {
    fn render(&self) -> String {
        match self {
            SyncState::Local => String::new(),
            SyncState::SyncedExternal => "synced".green().to_string(),
            SyncState::PendingPush => "not pushed yet".yellow().to_string(),
            SyncState::PendingPull => "refreshing".yellow().to_string(),
        }
    }
}

impl Render for Event {
    fn render(&self) -> String {
        let time = format!("{:>19}", self.time_range_string());
        let title = if self.is_completed {
            self.display_title().strikethrough().dimmed().to_string()
        } else {
            self.display_title()
        };

        let mut line = format!(
            "  {} {} {}",
            time.dimmed(),
            title,
            format!("({})", self.duration_string()).dimmed()
        );
        if !self.notification_settings.minutes_before.is_empty() && self.notification_settings.enabled {
            let offsets: Vec<String> = self
                .notification_settings
                .minutes_before
                .iter()
                .map(|m| format!("{m}m"))
                .collect();
            line.push_str(&format!(" {}", format!("⏰ {}", offsets.join(",")).dimmed()));
        }
        let state = self.sync_state.render();
        if !state.is_empty() {
            line.push_str(&format!(" {state}"));
        }
        line.push_str(&format!(" {}", self.id.dimmed()));
        line
    }
}

impl Render for CalendarSource {
    fn render(&self) -> String {
        let access = if self.writable {
            String::new()
        } else {
            format!(" {}", "(read-only)".dimmed())
        };
        format!("📅 {} {}{}", self.display_name, format!("[{}]", self.id).dimmed(), access)
    }
}

impl Render for AuthorizationStatus {
    fn render(&self) -> String {
        match self {
            AuthorizationStatus::NotDetermined => "not requested".yellow().to_string(),
            AuthorizationStatus::FullAccess => "full access".green().to_string(),
            AuthorizationStatus::WriteOnly => "write only".yellow().to_string(),
            AuthorizationStatus::Denied => "denied".red().to_string(),
            AuthorizationStatus::Restricted => "restricted".red().to_string(),
        }
    }
}

impl Render for ReconcileReport {
    fn render(&self) -> String {
        let mut lines = Vec::new();

        if self.pulled() > 0 {
            lines.push(format!(
                "Pulled: {} created, {} updated, {} deleted",
                self.created.green(),
                self.updated.yellow(),
                self.deleted.red()
            ));
        }
        if self.pushed + self.retried > 0 {
            lines.push(format!("Pushed: {}", (self.pushed + self.retried).green()));
        }
        if self.failed > 0 {
            lines.push(format!("{} {}", self.failed.red(), "changes will be retried on the next sync".red()));
        }
        if lines.is_empty() {
            lines.push("Everything up to date".dimmed().to_string());
        }

        lines.join("\n")
    }
}

/// Render a due reminder for the terminal.
pub fn render_trigger(trigger: &NotificationTrigger, tz: Tz) -> String {
    format!(
        "{} {} {}",
        "⏰".bold(),
        trigger.payload.title.bold(),
        format!("{} ({})", trigger.payload.body, local_time(trigger.fires_at, tz)).dimmed()
    )
}

fn local_time(instant: DateTime<Utc>, tz: Tz) -> String {
    instant.with_timezone(&tz).format("%H:%M").to_string()
}

/// Format a day as a human-readable label (e.g. "Today", "Tomorrow", "Wed Mar 26")
pub fn date_label(day: DateKey, today: DateKey) -> String {
    match (day.date() - today.date()).num_days() {
        -1 => "Yesterday".to_string(),
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        _ => day.date().format("%a %b %-d").to_string(),
    }
}
