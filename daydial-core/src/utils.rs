use std::path::Path;

use crate::error::DayDialResult;

pub fn slugify(s: &str) -> String {
    let slug = slug::slugify(s);
    if slug.is_empty() {
        "calendar".to_string()
    } else {
        slug
    }
}

/// Write `content` next to `path` and rename it into place, so readers never
/// observe a half-written file.
pub fn write_atomic(path: &Path, content: &str) -> DayDialResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    std::fs::write(&temp, content)?;
    std::fs::rename(&temp, path)?;
    Ok(())
}
