use std::fmt;

/// What one reconcile pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Local events created from external records.
    pub created: usize,
    /// Local events overwritten by a newer external copy.
    pub updated: usize,
    /// Local events removed because their record vanished.
    pub deleted: usize,
    /// External records overwritten by a newer local copy.
    pub pushed: usize,
    /// Pending pushes that went through on retry.
    pub retried: usize,
    /// Changes that could not be applied and will be tried again.
    pub failed: usize,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        *self == ReconcileReport::default()
    }

    pub fn pulled(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "Everything up to date");
        }

        let mut parts = Vec::new();
        for (count, label) in [
            (self.created, "created"),
            (self.updated, "updated"),
            (self.deleted, "deleted"),
            (self.pushed + self.retried, "pushed"),
            (self.failed, "failed"),
        ] {
            if count > 0 {
                parts.push(format!("{count} {label}"));
            }
        }
        write!(f, "{}", parts.join(", "))
    }
}
