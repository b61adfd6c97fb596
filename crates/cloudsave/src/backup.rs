use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use tracing::info;

use crate::config::GameProfile;
use crate::error::{Error, ErrorKind, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupResult {
    pub dir: PathBuf,
    pub files: usize,
}

/// Copy the whole save directory into `backup_path/<unix-millis>/`.
/// The numeric timestamp keeps the folder name valid on filesystems that
/// reject colons. Any failure here must stop the sync run: a mutating
/// action may not proceed past a failed requested backup.
pub fn backup(profile: &GameProfile) -> Result<BackupResult> {
    let stamp = Utc::now().timestamp_millis();
    let dest = profile.backup_path.join(stamp.to_string());
    fs::create_dir_all(&dest).map_err(|e| {
        Error::new(
            ErrorKind::BackupDirectoryUnwritable,
            format!("failed to create backup directory {}: {e}", dest.display()),
        )
    })?;

    let mut files = 0usize;
    for entry in walkdir::WalkDir::new(&profile.path) {
        let entry = entry.map_err(|e| {
            Error::new(
                ErrorKind::CopyFailed,
                format!("failed to walk {}: {e}", profile.path.display()),
            )
        })?;
        let rel = entry.path().strip_prefix(&profile.path).map_err(|e| {
            Error::new(ErrorKind::CopyFailed, format!("strip_prefix failed: {e}"))
        })?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let out = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&out).map_err(|e| {
                Error::new(
                    ErrorKind::CopyFailed,
                    format!("failed to create {}: {e}", out.display()),
                )
            })?;
        } else {
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    Error::new(
                        ErrorKind::CopyFailed,
                        format!("failed to create {}: {e}", parent.display()),
                    )
                })?;
            }
            fs::copy(entry.path(), &out).map_err(|e| {
                Error::new(
                    ErrorKind::CopyFailed,
                    format!(
                        "failed to copy {} -> {}: {e}",
                        entry.path().display(),
                        out.display()
                    ),
                )
            })?;
            files += 1;
        }
    }

    info!(game = %profile.name, dir = %dest.display(), files, "backup complete");
    Ok(BackupResult { dir: dest, files })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn profile(saves: &Path, backups: &Path) -> GameProfile {
        GameProfile {
            name: "test-game".into(),
            path: saves.to_path_buf(),
            backup_path: backups.to_path_buf(),
        }
    }

    #[test]
    fn copies_every_file_into_one_numeric_subfolder() {
        let saves = tempfile::tempdir().expect("saves dir");
        let backups = tempfile::tempdir().expect("backup dir");
        fs::write(saves.path().join("slot1.sav"), b"one").expect("write");
        fs::write(saves.path().join("slot2.sav"), b"two").expect("write");
        fs::create_dir(saves.path().join("profiles")).expect("mkdir");
        fs::write(saves.path().join("profiles/p.cfg"), b"cfg").expect("write");

        let result = backup(&profile(saves.path(), backups.path())).expect("backup");
        assert_eq!(result.files, 3);

        let subdirs: Vec<_> = fs::read_dir(backups.path())
            .expect("read backups")
            .map(|e| e.expect("entry").file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(subdirs.len(), 1);
        assert!(subdirs[0].chars().all(|c| c.is_ascii_digit()));

        assert_eq!(fs::read(result.dir.join("slot1.sav")).expect("read"), b"one");
        assert_eq!(fs::read(result.dir.join("slot2.sav")).expect("read"), b"two");
        assert_eq!(
            fs::read(result.dir.join("profiles/p.cfg")).expect("read"),
            b"cfg"
        );
    }

    #[test]
    fn missing_save_directory_is_copy_failed() {
        let backups = tempfile::tempdir().expect("backup dir");
        let p = GameProfile {
            name: "test-game".into(),
            path: backups.path().join("does-not-exist"),
            backup_path: backups.path().to_path_buf(),
        };
        let err = backup(&p).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CopyFailed);
    }

    #[cfg(unix)]
    #[test]
    fn unwritable_backup_destination_is_fatal() {
        use std::os::unix::fs::PermissionsExt;
        let saves = tempfile::tempdir().expect("saves dir");
        fs::write(saves.path().join("slot1.sav"), b"one").expect("write");
        let backups = tempfile::tempdir().expect("backup dir");
        fs::set_permissions(backups.path(), fs::Permissions::from_mode(0o555))
            .expect("chmod");
        if fs::create_dir(backups.path().join("probe")).is_ok() {
            // Running with privileges that ignore the mode bits.
            return;
        }
        let err = backup(&profile(saves.path(), backups.path())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackupDirectoryUnwritable);
        fs::set_permissions(backups.path(), fs::Permissions::from_mode(0o755))
            .expect("chmod back");
    }
}
