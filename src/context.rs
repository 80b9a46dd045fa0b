//! Wires the configured stores, scheduler and coordinator together.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use chrono_tz::Tz;
use daydial_core::bus::ScheduleChange;
use daydial_core::calendar::{CalendarAdapter, IcsDirStore};
use daydial_core::clock::{Clock, SystemClock};
use daydial_core::config::DayDialConfig;
use daydial_core::date_key::DateKey;
use daydial_core::notification::{JsonFileScheduler, TriggerManager};
use daydial_core::store::JsonDirStore;
use daydial_core::sync::SyncCoordinator;
use daydial_core::widget::{WidgetExporter, WidgetSnapshot};
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::utils::tui;

pub struct Context {
    pub config: DayDialConfig,
    pub calendar: Arc<IcsDirStore>,
    pub scheduler: Arc<JsonFileScheduler>,
    pub coordinator: Arc<SyncCoordinator>,
    widgets: WidgetExporter,
    changes: broadcast::Receiver<ScheduleChange>,
}

impl Context {
    pub fn load() -> Result<Self> {
        let config = DayDialConfig::load()?;
        let tz = config.tz(host_time_zone())?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let calendar_dir = config.calendar_dir.display().to_string();
        let calendar = Arc::new(
            IcsDirStore::new(
                config.calendar_path(),
                tz,
                Box::new(move || {
                    tui::confirm(&format!("Allow daydial to read and write the calendars in {calendar_dir}?"))
                }),
            )
            .with_clock(clock.clone()),
        );

        let scheduler = Arc::new(JsonFileScheduler::new(
            config.reminders_path(),
            Box::new(|| tui::confirm("Allow daydial to show reminders?")),
        ));

        let store = JsonDirStore::open(config.events_path())?;
        let adapter = Arc::new(CalendarAdapter::new(calendar.clone(), tz));
        let triggers = Arc::new(TriggerManager::new(scheduler.clone(), clock.clone(), tz));

        let coordinator = SyncCoordinator::new(Box::new(store), adapter, triggers, config.sync_settings(), clock)
            .with_default_reminders(config.notifications.default_minutes_before.iter().copied());
        let changes = coordinator.bus().subscribe();

        Ok(Context {
            widgets: WidgetExporter::new(config.widget_path()),
            config,
            calendar,
            scheduler,
            coordinator: Arc::new(coordinator),
            changes,
        })
    }

    pub fn today(&self) -> DateKey {
        self.coordinator.today()
    }

    pub fn tz(&self) -> Tz {
        self.coordinator.tz()
    }

    /// Persist the coordinator's sync settings to the config file.
    pub fn save_sync_settings(&mut self) -> Result<()> {
        self.config.set_sync_settings(&self.coordinator.settings());
        self.config.save()?;
        Ok(())
    }

    /// Rewrite the widget snapshot of every day changed since the last call.
    pub fn refresh_widgets(&mut self) -> Result<()> {
        let mut days = BTreeSet::new();
        loop {
            match self.changes.try_recv() {
                Ok(change) => {
                    days.insert(change.date_key);
                }
                Err(TryRecvError::Lagged(_)) => {
                    days.extend(self.coordinator.settings().window(self.today()).days());
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }

        for day in days {
            let events = self.coordinator.events_on(day)?;
            self.widgets.write(&WidgetSnapshot::of_day(day, &events, Utc::now()))?;
        }
        Ok(())
    }
}

/// The system time zone, or UTC when it cannot be determined.
fn host_time_zone() -> Tz {
    iana_time_zone::get_timezone()
        .ok()
        .and_then(|name| name.parse().ok())
        .unwrap_or(chrono_tz::UTC)
}
