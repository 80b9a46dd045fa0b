//! A calendar store backed by a directory of `.ics` files.
//!
//! Layout:
//!
//! ```text
//! calendar_dir/
//!   .daydial/access.toml          authorization answer
//!   work/
//!     .daydial/config.toml        name, color, writable
//!     2025-03-20T0900__standup.ics
//! ```
//!
//! Other tools may edit the directory at any time. `watch` polls a
//! fingerprint of the tree and fires the change signal when it moves.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::calendar::{AuthorizationStatus, CalendarSource, CalendarStore, ExternalRecord};
use crate::clock::{Clock, SystemClock};
use crate::error::{DayDialError, DayDialResult};
use crate::event::DEFAULT_COLOR_TAG;
use crate::ics::{generate_ics, parse_ics};
use crate::utils::{slugify, write_atomic};

const META_DIR: &str = ".daydial";
const ACCESS_FILE: &str = "access.toml";
const CONFIG_FILE: &str = "config.toml";

/// Shows the access prompt; true means the user allowed access.
pub type AccessPrompt = Box<dyn Fn() -> bool + Send + Sync>;

#[derive(Debug, Serialize, Deserialize, Default)]
struct AccessFile {
    status: AuthorizationStatus,
}

/// Per-calendar `.daydial/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarDirConfig {
    pub name: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_writable")]
    pub writable: bool,
}

fn default_color() -> String {
    DEFAULT_COLOR_TAG.to_string()
}

fn default_writable() -> bool {
    true
}

pub struct IcsDirStore {
    root: PathBuf,
    tz: Tz,
    prompt: AccessPrompt,
    clock: Arc<dyn Clock>,
    changes: broadcast::Sender<()>,
    fingerprint: Mutex<u64>,
}

impl IcsDirStore {
    pub fn new(root: impl Into<PathBuf>, tz: Tz, prompt: AccessPrompt) -> Self {
        let (changes, _) = broadcast::channel(16);
        let store = IcsDirStore {
            root: root.into(),
            tz,
            prompt,
            clock: Arc::new(SystemClock),
            changes,
            fingerprint: Mutex::new(0),
        };
        store.remember_fingerprint();
        store
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn access_path(&self) -> PathBuf {
        self.root.join(META_DIR).join(ACCESS_FILE)
    }

    fn read_access(&self) -> AuthorizationStatus {
        std::fs::read_to_string(self.access_path())
            .ok()
            .and_then(|content| toml::from_str::<AccessFile>(&content).ok())
            .map(|file| file.status)
            .unwrap_or_default()
    }

    /// Persist an authorization answer, e.g. when the user changes it by hand.
    pub fn set_authorization(&self, status: AuthorizationStatus) -> DayDialResult<()> {
        let content = toml::to_string_pretty(&AccessFile { status })
            .map_err(|e| DayDialError::Config(e.to_string()))?;
        self.own_write(|| write_atomic(&self.access_path(), &content))
    }

    /// Create a calendar directory. The id is a unique slug of `name`.
    pub fn create_calendar(&self, name: &str, color: &str, writable: bool) -> DayDialResult<CalendarSource> {
        let base = slugify(name);
        let id = (1..=100)
            .map(|n| if n == 1 { base.clone() } else { format!("{base}-{n}") })
            .find(|candidate| !self.root.join(candidate).exists())
            .ok_or_else(|| DayDialError::Config(format!("Too many calendars named '{name}'")))?;

        let config = CalendarDirConfig {
            name: name.to_string(),
            color: color.to_string(),
            writable,
        };
        let content =
            toml::to_string_pretty(&config).map_err(|e| DayDialError::Config(e.to_string()))?;
        self.own_write(|| write_atomic(&self.root.join(&id).join(META_DIR).join(CONFIG_FILE), &content))?;

        Ok(CalendarSource {
            id,
            display_name: config.name,
            color_tag: config.color,
            writable,
        })
    }

    /// Discover calendars by scanning for subdirectories with a config file.
    fn scan_calendars(&self) -> DayDialResult<Vec<CalendarSource>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DayDialError::TransientIo(e.to_string())),
        };

        let mut calendars: Vec<CalendarSource> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .filter_map(|path| {
                let id = path.file_name()?.to_str()?.to_string();
                let content = std::fs::read_to_string(path.join(META_DIR).join(CONFIG_FILE)).ok()?;
                match toml::from_str::<CalendarDirConfig>(&content) {
                    Ok(config) => Some(CalendarSource {
                        id,
                        display_name: config.name,
                        color_tag: config.color,
                        writable: config.writable,
                    }),
                    Err(e) => {
                        warn!(calendar = %id, error = %e, "skipping calendar with unreadable config");
                        None
                    }
                }
            })
            .collect();

        calendars.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(calendars)
    }

    fn writable_calendar_dir(&self, calendar_id: &str) -> DayDialResult<PathBuf> {
        let dir = self.calendar_dir(calendar_id)?;
        let content = std::fs::read_to_string(dir.join(META_DIR).join(CONFIG_FILE))
            .map_err(|e| DayDialError::TransientIo(e.to_string()))?;
        let config: CalendarDirConfig =
            toml::from_str(&content).map_err(|e| DayDialError::Config(e.to_string()))?;
        if !config.writable {
            return Err(DayDialError::SourceNotFound(calendar_id.to_string()));
        }
        Ok(dir)
    }

    fn calendar_dir(&self, calendar_id: &str) -> DayDialResult<PathBuf> {
        let dir = self.root.join(calendar_id);
        if calendar_id.is_empty()
            || calendar_id.contains(['/', '\\'])
            || !dir.join(META_DIR).join(CONFIG_FILE).exists()
        {
            return Err(DayDialError::SourceNotFound(calendar_id.to_string()));
        }
        Ok(dir)
    }

    /// `.ics` files of a calendar with their parsed records.
    fn read_calendar(&self, calendar_id: &str) -> DayDialResult<Vec<(PathBuf, ExternalRecord)>> {
        let dir = self.calendar_dir(calendar_id)?;
        let entries = std::fs::read_dir(&dir).map_err(|e| DayDialError::TransientIo(e.to_string()))?;

        Ok(entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|e| e == "ics"))
            .filter_map(|path| {
                let content = std::fs::read_to_string(&path).ok()?;
                match parse_ics(&content, calendar_id, self.tz) {
                    Some(record) => Some((path, record)),
                    None => {
                        debug!(path = %path.display(), "skipping unparseable ics file");
                        None
                    }
                }
            })
            .collect())
    }

    fn find(&self, id: &str) -> DayDialResult<Option<(PathBuf, ExternalRecord)>> {
        for calendar in self.scan_calendars()? {
            if let Some(found) = self
                .read_calendar(&calendar.id)?
                .into_iter()
                .find(|(_, record)| record.id == id)
            {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Returns the path the record now lives at.
    fn write_record(&self, record: &ExternalRecord) -> DayDialResult<PathBuf> {
        let dir = self.writable_calendar_dir(&record.calendar_id)?;
        self.own_write(|| {
            let path = dir.join(filename_for(record, &dir, self.tz)?);
            write_atomic(&path, &generate_ics(record))?;
            Ok(path)
        })
    }

    /// Run one of our own writes without it counting as an outside change.
    /// Outside edits since the last poll are signalled first, so the write
    /// does not hide them.
    fn own_write<R>(&self, write: impl FnOnce() -> DayDialResult<R>) -> DayDialResult<R> {
        self.poll_changes();
        let result = write();
        self.remember_fingerprint();
        result
    }

    /// Hash of every file path, size and mtime under the root.
    fn current_fingerprint(&self) -> u64 {
        let mut entries = Vec::new();
        collect_entries(&self.root, 0, &mut entries);
        entries.sort();

        let mut hasher = DefaultHasher::new();
        entries.hash(&mut hasher);
        hasher.finish()
    }

    /// Record the current tree so our own writes do not count as outside changes.
    fn remember_fingerprint(&self) {
        let current = self.current_fingerprint();
        *self.fingerprint.lock().unwrap_or_else(|e| e.into_inner()) = current;
    }

    /// Fire the change signal if the tree changed since the last check.
    pub fn poll_changes(&self) -> bool {
        let current = self.current_fingerprint();
        let mut last = self.fingerprint.lock().unwrap_or_else(|e| e.into_inner());
        if *last == current {
            return false;
        }
        *last = current;
        drop(last);

        debug!(root = %self.root.display(), "calendar directory changed");
        let _ = self.changes.send(());
        true
    }

    /// Poll for outside changes every `interval` until the store is dropped.
    pub fn watch(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match store.upgrade() {
                    Some(store) => {
                        store.poll_changes();
                    }
                    None => break,
                }
            }
        })
    }
}

fn collect_entries(dir: &Path, depth: usize, out: &mut Vec<(PathBuf, u64, Option<std::time::SystemTime>)>) {
    // Calendars sit one level below the root, their metadata one more.
    if depth > 2 {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let Ok(meta) = entry.metadata() else { continue };
        if meta.is_dir() {
            collect_entries(&path, depth + 1, out);
        } else if !path.to_string_lossy().ends_with(".tmp") {
            out.push((path, meta.len(), meta.modified().ok()));
        }
    }
}

/// `{start}__{title-slug}.ics`, suffixed on collision with another record.
fn filename_for(record: &ExternalRecord, dir: &Path, tz: Tz) -> DayDialResult<String> {
    let stamp = record.start.with_timezone(&tz).format("%Y-%m-%dT%H%M");
    let stem = format!("{}__{}", stamp, slugify(&record.title));
    let base = format!("{stem}.ics");

    if !dir.join(&base).exists() || file_has_uid(dir, &base, &record.id, tz) {
        return Ok(base);
    }

    for n in 2..=100 {
        let suffixed = format!("{stem}-{n}.ics");
        if !dir.join(&suffixed).exists() || file_has_uid(dir, &suffixed, &record.id, tz) {
            return Ok(suffixed);
        }
    }

    Err(DayDialError::TransientIo(format!(
        "Too many filename collisions for {base}"
    )))
}

fn file_has_uid(dir: &Path, filename: &str, uid: &str, tz: Tz) -> bool {
    std::fs::read_to_string(dir.join(filename))
        .ok()
        .and_then(|content| parse_ics(&content, "", tz))
        .is_some_and(|r| r.id == uid)
}

fn remove_file(path: &Path) -> DayDialResult<()> {
    std::fs::remove_file(path).map_err(|e| DayDialError::TransientIo(e.to_string()))
}

#[async_trait]
impl CalendarStore for IcsDirStore {
    async fn authorization(&self) -> AuthorizationStatus {
        self.read_access()
    }

    async fn request_access(&self) -> DayDialResult<bool> {
        let status = self.read_access();
        if status != AuthorizationStatus::NotDetermined {
            return Ok(status.can_write());
        }

        let status = if (self.prompt)() {
            AuthorizationStatus::FullAccess
        } else {
            AuthorizationStatus::Denied
        };
        self.set_authorization(status)?;
        Ok(status.can_write())
    }

    async fn calendars(&self) -> DayDialResult<Vec<CalendarSource>> {
        self.scan_calendars()
    }

    async fn events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        calendar_ids: &[String],
    ) -> DayDialResult<Vec<ExternalRecord>> {
        let mut records = Vec::new();
        for calendar_id in calendar_ids {
            let files = match self.read_calendar(calendar_id) {
                Ok(files) => files,
                Err(DayDialError::SourceNotFound(_)) => {
                    warn!(calendar = %calendar_id, "selected calendar no longer exists");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let in_window = files
                .into_iter()
                .map(|(_, record)| record)
                .filter(|r| r.start < end && (r.end > start || r.start >= start));
            records.extend(in_window);
        }
        records.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn create(&self, mut record: ExternalRecord) -> DayDialResult<ExternalRecord> {
        record.id = uuid::Uuid::new_v4().to_string();
        record.last_modified = self.clock.now();
        self.write_record(&record)?;
        Ok(record)
    }

    async fn event(&self, id: &str) -> DayDialResult<Option<ExternalRecord>> {
        Ok(self.find(id)?.map(|(_, record)| record))
    }

    async fn update(&self, mut record: ExternalRecord) -> DayDialResult<ExternalRecord> {
        let (old_path, old) = self
            .find(&record.id)?
            .ok_or_else(|| DayDialError::ExternalRecordNotFound(record.id.clone()))?;
        self.writable_calendar_dir(&old.calendar_id)?;
        self.writable_calendar_dir(&record.calendar_id)?;

        record.last_modified = self.clock.now();
        // The filename follows start time and title. The old file only goes
        // once the new one is in place.
        let new_path = self.write_record(&record)?;
        if new_path != old_path {
            self.own_write(|| remove_file(&old_path))?;
        }
        Ok(record)
    }

    async fn remove(&self, id: &str) -> DayDialResult<bool> {
        match self.find(id)? {
            Some((path, record)) => {
                self.writable_calendar_dir(&record.calendar_id)?;
                self.own_write(|| remove_file(&path))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn store(dir: &Path, allow: bool) -> IcsDirStore {
        IcsDirStore::new(dir, chrono_tz::UTC, Box::new(move || allow))
    }

    fn record(calendar_id: &str, title: &str, hour: u32) -> ExternalRecord {
        ExternalRecord {
            id: String::new(),
            calendar_id: calendar_id.to_string(),
            title: title.to_string(),
            notes: None,
            start: Utc.with_ymd_and_hms(2025, 3, 20, hour, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 3, 20, hour + 1, 0, 0).unwrap(),
            alarms: vec![-10],
            last_modified: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2025, 3, 20, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 21, 0, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_access_answer_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let denied = store(dir.path(), false);
        assert_eq!(denied.authorization().await, AuthorizationStatus::NotDetermined);
        assert!(!denied.request_access().await.unwrap());

        // A second store with a permissive prompt still sees the denial.
        let again = store(dir.path(), true);
        assert!(!again.request_access().await.unwrap());
        assert_eq!(again.authorization().await, AuthorizationStatus::Denied);
    }

    #[tokio::test]
    async fn test_create_calendar_uses_unique_slugs() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), true);
        let first = store.create_calendar("Work Stuff", "red", true).unwrap();
        let second = store.create_calendar("Work Stuff", "blue", false).unwrap();
        assert_eq!(first.id, "work-stuff");
        assert_eq!(second.id, "work-stuff-2");

        let calendars = store.calendars().await.unwrap();
        assert_eq!(calendars.len(), 2);
        assert!(!calendars[1].writable);
        assert_eq!(calendars[0].color_tag, "red");
    }

    #[tokio::test]
    async fn test_create_update_remove_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), true);
        store.create_calendar("Work", "blue", true).unwrap();

        let created = store.create(record("work", "☕ Coffee", 9)).await.unwrap();
        assert!(!created.id.is_empty());
        assert!(dir.path().join("work/2025-03-20T0900__coffee.ics").exists());

        let (start, end) = window();
        let listed = store.events(start, end, &["work".to_string()]).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "☕ Coffee");
        assert_eq!(listed[0].alarms, vec![-10]);

        let mut moved = created.clone();
        moved.start = Utc.with_ymd_and_hms(2025, 3, 20, 11, 0, 0).unwrap();
        moved.end = Utc.with_ymd_and_hms(2025, 3, 20, 12, 0, 0).unwrap();
        store.update(moved).await.unwrap();
        assert!(!dir.path().join("work/2025-03-20T0900__coffee.ics").exists());
        assert!(dir.path().join("work/2025-03-20T1100__coffee.ics").exists());

        assert!(store.remove(&created.id).await.unwrap());
        assert!(!store.remove(&created.id).await.unwrap());
        assert!(store.events(start, end, &["work".to_string()]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_update_keeps_old_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), true);
        store.create_calendar("Work", "blue", true).unwrap();
        let created = store.create(record("work", "Coffee", 9)).await.unwrap();

        // A directory in the way of the temp file makes the write fail.
        std::fs::create_dir_all(dir.path().join("work/2025-03-20T1100__coffee.ics.tmp")).unwrap();
        let mut moved = created.clone();
        moved.start = Utc.with_ymd_and_hms(2025, 3, 20, 11, 0, 0).unwrap();
        moved.end = Utc.with_ymd_and_hms(2025, 3, 20, 12, 0, 0).unwrap();
        assert!(store.update(moved).await.is_err());

        assert!(dir.path().join("work/2025-03-20T0900__coffee.ics").exists());
        let kept = store.event(&created.id).await.unwrap().unwrap();
        assert_eq!(kept.start, created.start);
    }

    #[tokio::test]
    async fn test_update_in_place_keeps_filename() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), true);
        store.create_calendar("Work", "blue", true).unwrap();
        let created = store.create(record("work", "Coffee", 9)).await.unwrap();

        let mut noted = created.clone();
        noted.notes = Some("oat milk".to_string());
        store.update(noted).await.unwrap();

        assert!(dir.path().join("work/2025-03-20T0900__coffee.ics").exists());
        assert!(!dir.path().join("work/2025-03-20T0900__coffee-2.ics").exists());
        let stored = store.event(&created.id).await.unwrap().unwrap();
        assert_eq!(stored.notes.as_deref(), Some("oat milk"));
    }

    #[tokio::test]
    async fn test_update_missing_record_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), true);
        store.create_calendar("Work", "blue", true).unwrap();
        let mut r = record("work", "Ghost", 9);
        r.id = "gone".to_string();
        assert!(matches!(
            store.update(r).await,
            Err(DayDialError::ExternalRecordNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_in_unknown_calendar_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), true);
        assert!(matches!(
            store.create(record("nope", "x", 9)).await,
            Err(DayDialError::SourceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_read_only_calendar_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), true);
        store.create_calendar("Holidays", "green", false).unwrap();
        let ics = generate_ics(&ExternalRecord {
            id: "h-1".to_string(),
            ..record("holidays", "Spring", 9)
        });
        std::fs::write(dir.path().join("holidays/spring.ics"), ics).unwrap();

        assert!(store.event("h-1").await.unwrap().is_some());
        assert!(matches!(
            store.create(record("holidays", "x", 9)).await,
            Err(DayDialError::SourceNotFound(_))
        ));
        assert!(matches!(store.remove("h-1").await, Err(DayDialError::SourceNotFound(_))));
        assert!(dir.path().join("holidays/spring.ics").exists());
    }

    #[tokio::test]
    async fn test_same_title_and_time_get_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), true);
        store.create_calendar("Work", "blue", true).unwrap();
        store.create(record("work", "Standup", 9)).await.unwrap();
        store.create(record("work", "Standup", 9)).await.unwrap();
        assert!(dir.path().join("work/2025-03-20T0900__standup-2.ics").exists());
    }

    #[tokio::test]
    async fn test_outside_edits_fire_change_signal() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), true);
        store.create_calendar("Work", "blue", true).unwrap();
        let mut changes = store.subscribe();

        store.create(record("work", "Ours", 9)).await.unwrap();
        assert!(!store.poll_changes());

        let other = generate_ics(&ExternalRecord {
            id: "theirs".to_string(),
            ..record("work", "Theirs", 13)
        });
        std::fs::write(dir.path().join("work/theirs.ics"), other).unwrap();

        assert!(store.poll_changes());
        assert!(changes.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_outside_edit_is_not_hidden_by_own_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), true);
        store.create_calendar("Work", "blue", true).unwrap();
        let mut changes = store.subscribe();

        let other = generate_ics(&ExternalRecord {
            id: "theirs".to_string(),
            ..record("work", "Theirs", 13)
        });
        std::fs::write(dir.path().join("work/theirs.ics"), other).unwrap();
        store.create(record("work", "Ours", 9)).await.unwrap();

        assert!(changes.try_recv().is_ok());
        assert!(!store.poll_changes());
    }
}
