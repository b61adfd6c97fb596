use std::fs;
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;

use crate::error::{Error, ErrorKind, Result};

/// Point-in-time view of the newest file in a save directory. Rebuilt on
/// every sync attempt, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveSnapshot {
    pub file_name: String,
    pub modified_at: DateTime<Utc>,
}

/// Drop sub-millisecond precision so a timestamp written to the manifest as
/// RFC 3339 compares equal after a round trip.
pub fn truncate_to_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(t.timestamp_millis())
        .single()
        .unwrap_or(t)
}

/// List `dir` and return the newest regular file by modification time.
/// Ties on the timestamp go to the lexicographically greatest file name so
/// the result is deterministic.
pub fn inspect(dir: &Path) -> Result<SaveSnapshot> {
    let entries = fs::read_dir(dir).map_err(|e| {
        Error::new(
            ErrorKind::DirectoryUnreadable,
            format!("failed to list save directory {}: {e}", dir.display()),
        )
    })?;

    let mut newest: Option<SaveSnapshot> = None;
    for entry in entries {
        let entry = entry.map_err(|e| {
            Error::new(
                ErrorKind::DirectoryUnreadable,
                format!("failed to list save directory {}: {e}", dir.display()),
            )
        })?;
        let meta = entry.metadata().map_err(|e| {
            Error::new(
                ErrorKind::DirectoryUnreadable,
                format!("failed to stat {}: {e}", entry.path().display()),
            )
        })?;
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().map_err(|e| {
            Error::new(
                ErrorKind::DirectoryUnreadable,
                format!("failed to read mtime of {}: {e}", entry.path().display()),
            )
        })?;
        let candidate = SaveSnapshot {
            file_name: entry.file_name().to_string_lossy().to_string(),
            modified_at: truncate_to_millis(DateTime::<Utc>::from(modified)),
        };
        newest = Some(match newest.take() {
            None => candidate,
            Some(current) => pick_newer(current, candidate),
        });
    }

    let snapshot = newest.ok_or_else(|| {
        Error::new(
            ErrorKind::NoSaveFiles,
            format!("no save files found in {}", dir.display()),
        )
    })?;
    debug!(file = %snapshot.file_name, modified = %snapshot.modified_at, "newest local save");
    Ok(snapshot)
}

fn pick_newer(a: SaveSnapshot, b: SaveSnapshot) -> SaveSnapshot {
    if b.modified_at > a.modified_at || (b.modified_at == a.modified_at && b.file_name > a.file_name)
    {
        b
    } else {
        a
    }
}
