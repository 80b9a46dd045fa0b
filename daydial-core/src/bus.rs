//! Change notifications for the day views and the widget.

use tokio::sync::broadcast;
use tracing::trace;

use crate::date_key::DateKey;

const BUS_CAPACITY: usize = 256;

/// A day whose event list changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleChange {
    pub date_key: DateKey,
}

/// Broadcasts a `ScheduleChange` after every local mutation.
///
/// Receivers that fall behind lose the oldest changes and see
/// `RecvError::Lagged`; they should then reload whatever days they show.
#[derive(Debug, Clone)]
pub struct ScheduleBus {
    sender: broadcast::Sender<ScheduleChange>,
}

impl ScheduleBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        ScheduleBus { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScheduleChange> {
        self.sender.subscribe()
    }

    pub fn emit(&self, date_key: DateKey) {
        trace!(%date_key, "schedule changed");
        // Nobody listening is fine.
        let _ = self.sender.send(ScheduleChange { date_key });
    }
}

impl Default for ScheduleBus {
    fn default() -> Self {
        Self::new()
    }
}
