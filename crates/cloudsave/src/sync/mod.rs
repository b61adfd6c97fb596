use std::fs;

use chrono::{DateTime, Utc};
use filetime::FileTime;
use tracing::{debug, info, warn};

use crate::backup;
use crate::config::GameProfile;
use crate::error::{Error, ErrorKind, Result};
use crate::local::{self, SaveSnapshot};
use crate::manifest::{self, LastSaved, MANIFEST_FILE, Manifest};
use crate::prompt::{Prompt, is_yes};
use crate::reconcile::{self, SyncAction};
use crate::remote::RemoteStore;

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Uploaded {
        file_name: String,
        last_saved: DateTime<Utc>,
    },
    Downloaded {
        file_name: String,
    },
    /// User declined or chose to exit; nothing was mutated.
    Skipped,
}

/// Drives one game through inspect -> decide -> (backup) -> execute.
/// One engine run mutates at most one save object and one manifest, in that
/// order, both through compare-and-swap writes.
pub struct SyncEngine<'a, S: RemoteStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: RemoteStore + ?Sized> SyncEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Full interactive run for one game. Failures abort immediately; no
    /// step is retried and no partial manifest state is written.
    pub fn run(&self, profile: &GameProfile, prompt: &mut dyn Prompt) -> Result<SyncOutcome> {
        // Inspecting
        let snapshot = local::inspect(&profile.path)?;
        info!(game = %profile.name, newest = %snapshot.file_name, "inspected save directory");
        let man = manifest::read(self.store, &profile.name)?;

        // Deciding
        let decision = reconcile::decide(snapshot.modified_at, &man.last_saved);
        debug!(game = %profile.name, state = ?decision.state, "reconciled");

        // Backup before anything mutating. A requested backup that fails is
        // fatal for the whole run.
        let wants_backup = is_yes(&prompt.ask(
            "Before we move any files, would you like to backup your saves? (Y/N)",
        )?);
        if wants_backup {
            backup::backup(profile)?;
        }

        // Executing. The engine only ever recommends; every mutating branch
        // runs behind an explicit confirmation, and the manual override is
        // reachable from every state.
        match decision.recommended {
            SyncAction::Upload => {
                let answer = prompt.ask(
                    "Your local save is newer than the one stored in the repo. \
                     Would you like to upload it? (Y/N/E)",
                )?;
                match answer.trim().to_ascii_lowercase().as_str() {
                    "y" => self.upload(profile, &snapshot, &man),
                    "e" => self.manual(profile, &snapshot, &man, prompt),
                    _ => Ok(SyncOutcome::Skipped),
                }
            }
            SyncAction::Download => {
                let answer = prompt.ask(
                    "Your local save is older than the one stored in the repo. \
                     Would you like to download the latest save? (Y/N/E)",
                )?;
                match answer.trim().to_ascii_lowercase().as_str() {
                    "y" => self.download(profile, &man),
                    "e" => self.manual(profile, &snapshot, &man, prompt),
                    _ => Ok(SyncOutcome::Skipped),
                }
            }
            SyncAction::NoOp | SyncAction::AskUser => {
                match &man.last_saved {
                    LastSaved::At(t) => prompt.notify(&format!(
                        "It looks like your save is up to date with the one in the cloud. \
                         Cloud date: {}. Local date: {}.",
                        manifest::format_timestamp(*t),
                        manifest::format_timestamp(snapshot.modified_at)
                    )),
                    LastSaved::Invalid(raw) => {
                        warn!(game = %profile.name, "manifest timestamp is unreadable");
                        prompt.notify(&format!(
                            "The manifest for '{}' has an unreadable lastSaved value: '{raw}'.",
                            profile.name
                        ));
                    }
                    LastSaved::Never => {}
                }
                self.manual(profile, &snapshot, &man, prompt)
            }
        }
    }

    /// Manual override: explicit upload, download, or exit, regardless of
    /// what the decision table recommended.
    fn manual(
        &self,
        profile: &GameProfile,
        snapshot: &SaveSnapshot,
        man: &Manifest,
        prompt: &mut dyn Prompt,
    ) -> Result<SyncOutcome> {
        let answer = prompt.ask("Upload, download or exit? (U/D/E)")?;
        match answer.trim().to_ascii_lowercase().as_str() {
            "u" => self.upload(profile, snapshot, man),
            "d" => self.download(profile, man),
            _ => Ok(SyncOutcome::Skipped),
        }
    }

    /// Push the newest local save, then record its mtime in the manifest.
    /// Object write first: the manifest must never claim a save time for
    /// content that was not actually stored. Both writes are CAS-guarded;
    /// either conflict aborts without retrying, since a fresher hash would
    /// mask a real concurrent writer.
    pub fn upload(
        &self,
        profile: &GameProfile,
        snapshot: &SaveSnapshot,
        man: &Manifest,
    ) -> Result<SyncOutcome> {
        let local_path = profile.path.join(&snapshot.file_name);
        let content = fs::read(&local_path).map_err(|e| {
            Error::new(
                ErrorKind::DirectoryUnreadable,
                format!("failed to read save file {}: {e}", local_path.display()),
            )
        })?;

        let object_path = format!("{}/{}", profile.name, snapshot.file_name);
        // Hash fetched immediately before the write, per the CAS contract.
        let current = self.store.get(&object_path)?;
        let expected = current.as_ref().map(|f| f.hash.as_str());
        let message = format!(
            "{}: Uploading save file for {}",
            manifest::format_timestamp(Utc::now()),
            profile.name
        );
        let new_hash = self
            .store
            .put(&object_path, &content, expected, &message)?;
        debug!(game = %profile.name, hash = %new_hash, "save object stored");

        // From here the run must not stop silently: the object is already
        // stored, so a manifest failure is reported as divergence.
        manifest::write(
            self.store,
            &profile.name,
            snapshot.modified_at,
            &man.content_hash,
        )
        .map_err(|e| {
            e.context(format!(
                "save object for '{}' was stored but the manifest was not updated",
                profile.name
            ))
        })?;

        info!(game = %profile.name, file = %snapshot.file_name, "upload complete");
        Ok(SyncOutcome::Uploaded {
            file_name: snapshot.file_name.clone(),
            last_saved: snapshot.modified_at,
        })
    }

    /// Fetch the game's single save object and write it under its exact
    /// remote name. The file's mtime is set to the manifest `lastSaved` so
    /// an immediately following run reconciles as in-sync.
    pub fn download(&self, profile: &GameProfile, man: &Manifest) -> Result<SyncOutcome> {
        let entries = self.store.list(&profile.name)?;
        let mut saves = entries.into_iter().filter(|e| e.name != MANIFEST_FILE);
        let Some(save) = saves.next() else {
            return Err(Error::new(
                ErrorKind::RemoteSaveNotFound,
                format!("no save object stored for '{}'", profile.name),
            ));
        };
        if let Some(extra) = saves.next() {
            return Err(Error::new(
                ErrorKind::RemoteSaveNotFound,
                format!(
                    "expected a single save object for '{}', found at least '{}' and '{}'",
                    profile.name, save.name, extra.name
                ),
            ));
        }

        let object_path = format!("{}/{}", profile.name, save.name);
        let Some(file) = self.store.get(&object_path)? else {
            return Err(Error::new(
                ErrorKind::RemoteSaveNotFound,
                format!("save object '{object_path}' vanished between list and fetch"),
            ));
        };

        let dest = profile.path.join(&file.name);
        fs::write(&dest, &file.content).map_err(|e| {
            Error::new(
                ErrorKind::LocalWriteFailed,
                format!("failed to write save file {}: {e}", dest.display()),
            )
        })?;
        if let LastSaved::At(t) = man.last_saved {
            let mtime = FileTime::from_unix_time(t.timestamp(), t.timestamp_subsec_nanos());
            filetime::set_file_mtime(&dest, mtime).map_err(|e| {
                Error::new(
                    ErrorKind::LocalWriteFailed,
                    format!("failed to set mtime on {}: {e}", dest.display()),
                )
            })?;
        }

        info!(game = %profile.name, file = %file.name, "download complete");
        Ok(SyncOutcome::Downloaded {
            file_name: file.name,
        })
    }
}

/// Create an empty manifest for every registered game, fanning the
/// independent creation calls out across threads. Create-only: existing
/// manifests are never overwritten, and any failure fails provisioning.
pub fn provision<S: RemoteStore + Sync + ?Sized>(store: &S, games: &[String]) -> Result<usize> {
    let results = std::thread::scope(|scope| {
        let handles: Vec<_> = games
            .iter()
            .map(|game| scope.spawn(move || manifest::create(store, game)))
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join().unwrap_or_else(|_| {
                    Err(Error::new(
                        ErrorKind::RemoteUnavailable,
                        "provisioning worker panicked",
                    ))
                })
            })
            .collect::<Vec<_>>()
    });

    let mut created = 0usize;
    for result in results {
        result?;
        created += 1;
    }
    info!(created, "remote structure provisioned");
    Ok(created)
}
