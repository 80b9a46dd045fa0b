use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diff::DiffKind;
use crate::event::Event;

/// One change to apply to one side.
///
/// Creates carry only `new`, deletes only `old`, updates both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDiff {
    pub kind: DiffKind,
    pub old: Option<Event>,
    pub new: Option<Event>,
}

impl fmt::Display for EventDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.event() {
            Some(event) => write!(
                f,
                "{} {} {} {}",
                self.kind,
                event.date_key,
                event.time_range_string(),
                event.display_title()
            ),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl EventDiff {
    /// The diff that turns `old_event` into `new_event`, or `None` when the
    /// mirrored content is already the same.
    pub fn get_diff(old_event: Option<Event>, new_event: Option<Event>) -> Option<EventDiff> {
        match (&old_event, &new_event) {
            (None, Some(_)) => Some(EventDiff {
                kind: DiffKind::Create,
                old: None,
                new: new_event,
            }),
            (Some(_), None) => Some(EventDiff {
                kind: DiffKind::Delete,
                old: old_event,
                new: None,
            }),
            (Some(old), Some(new)) => {
                if old.same_content(new) {
                    None
                } else {
                    Some(EventDiff {
                        kind: DiffKind::Update,
                        old: old_event,
                        new: new_event,
                    })
                }
            }
            (None, None) => None,
        }
    }

    /// The event (prefer new, fallback to old)
    pub fn event(&self) -> Option<&Event> {
        self.new.as_ref().or(self.old.as_ref())
    }
}
