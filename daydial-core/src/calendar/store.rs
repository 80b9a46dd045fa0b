use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::calendar::{AuthorizationStatus, CalendarSource, ExternalRecord};
use crate::error::DayDialResult;

/// The external calendar store the adapter talks to.
///
/// Implementations do not enforce authorization themselves; the adapter
/// checks `authorization()` before every call.
#[async_trait]
pub trait CalendarStore: Send + Sync {
    async fn authorization(&self) -> AuthorizationStatus;

    /// Show the one-shot access prompt and persist the answer.
    async fn request_access(&self) -> DayDialResult<bool>;

    async fn calendars(&self) -> DayDialResult<Vec<CalendarSource>>;

    /// Records in `calendar_ids` overlapping `[start, end)`.
    async fn events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        calendar_ids: &[String],
    ) -> DayDialResult<Vec<ExternalRecord>>;

    /// One record by id, wherever it is in time.
    async fn event(&self, id: &str) -> DayDialResult<Option<ExternalRecord>>;

    /// Store a new record. The store assigns `id` and `last_modified`.
    async fn create(&self, record: ExternalRecord) -> DayDialResult<ExternalRecord>;

    /// Replace the record with the same id.
    /// Fails with `ExternalRecordNotFound` when it no longer exists.
    async fn update(&self, record: ExternalRecord) -> DayDialResult<ExternalRecord>;

    /// Returns false when there was nothing to remove.
    /// Records of read-only calendars fail with `SourceNotFound`.
    async fn remove(&self, id: &str) -> DayDialResult<bool>;

    /// Coarse "something changed" signal, no payload.
    fn subscribe(&self) -> broadcast::Receiver<()>;
}
