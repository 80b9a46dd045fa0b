//! Error types for daydial.

use std::fmt;

use thiserror::Error;

/// Which permission a `NotAuthorized` error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Calendar,
    Notifications,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::Calendar => write!(f, "calendar"),
            Permission::Notifications => write!(f, "notification"),
        }
    }
}

/// Errors that can occur in daydial operations.
///
/// The first four variants are the sync taxonomy: everything the external
/// calendar or the notification scheduler can report back to the coordinator.
#[derive(Error, Debug, Clone)]
pub enum DayDialError {
    #[error("No {0} access. Grant it in your system settings")]
    NotAuthorized(Permission),

    #[error("External calendar record not found: {0}")]
    ExternalRecordNotFound(String),

    #[error("Calendar not found: {0}")]
    SourceNotFound(String),

    #[error("Calendar store unavailable: {0}")]
    TransientIo(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Event not found: {0}")]
    EventNotFound(String),

    #[error("Invalid date '{0}'. Expected YYYY-MM-DD")]
    InvalidDateKey(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("ICS parse error: {0}")]
    IcsParse(String),
}

impl DayDialError {
    /// Whether the next reconciliation pass may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DayDialError::TransientIo(_) | DayDialError::Io(_))
    }
}

impl From<std::io::Error> for DayDialError {
    fn from(e: std::io::Error) -> Self {
        DayDialError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for DayDialError {
    fn from(e: serde_json::Error) -> Self {
        DayDialError::Serialization(e.to_string())
    }
}

/// Result type alias for daydial operations.
pub type DayDialResult<T> = Result<T, DayDialError>;
