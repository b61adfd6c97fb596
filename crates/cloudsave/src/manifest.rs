use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, ErrorKind, Result};
use crate::local::truncate_to_millis;
use crate::remote::RemoteStore;

pub const MANIFEST_FILE: &str = "manifest.json";

/// When a game's save was last considered authoritative, as recorded in the
/// remote manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LastSaved {
    /// Empty field: the game has never been synced.
    Never,
    At(DateTime<Utc>),
    /// Non-empty but not a parseable timestamp. Carried so the caller can
    /// show the raw value instead of guessing a direction.
    Invalid(String),
}

/// One manifest per game. `content_hash` is required to perform a safe
/// overwrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub last_saved: LastSaved,
    pub content_hash: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct ManifestBody {
    #[serde(rename = "lastSaved", default)]
    last_saved: String,
}

pub fn manifest_path(game: &str) -> String {
    format!("{game}/{MANIFEST_FILE}")
}

/// Format used for `lastSaved` and for commit message prefixes.
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_last_saved(raw: &str) -> LastSaved {
    let raw = raw.trim();
    if raw.is_empty() {
        return LastSaved::Never;
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(t) => LastSaved::At(truncate_to_millis(t.with_timezone(&Utc))),
        Err(_) => LastSaved::Invalid(raw.to_string()),
    }
}

/// Read a game's manifest. A missing remote object is `ManifestMissing`,
/// distinct from transport errors; so is a manifest whose body is not the
/// expected JSON shape, since neither can anchor a sync decision.
pub fn read<S: RemoteStore + ?Sized>(store: &S, game: &str) -> Result<Manifest> {
    let path = manifest_path(game);
    let Some(file) = store.get(&path)? else {
        return Err(Error::new(
            ErrorKind::ManifestMissing,
            format!("no manifest found for '{game}' (expected remote object '{path}')"),
        ));
    };
    let body: ManifestBody = serde_json::from_slice(&file.content).map_err(|e| {
        Error::new(
            ErrorKind::ManifestMissing,
            format!("manifest for '{game}' is not valid JSON: {e}"),
        )
    })?;
    let last_saved = parse_last_saved(&body.last_saved);
    debug!(game, hash = %file.hash, "manifest read");
    Ok(Manifest {
        last_saved,
        content_hash: file.hash,
    })
}

fn encode_body(last_saved: &str) -> Result<Vec<u8>> {
    serde_json::to_vec(&ManifestBody {
        last_saved: last_saved.to_string(),
    })
    .map_err(|e| {
        Error::new(
            ErrorKind::Config,
            format!("failed to encode manifest body: {e}"),
        )
    })
}

/// Record a new `lastSaved` with a compare-and-swap against `expected_hash`.
/// Exactly one remote write; a stale hash fails with
/// `ConcurrentModification` and leaves the manifest untouched.
pub fn write<S: RemoteStore + ?Sized>(
    store: &S,
    game: &str,
    last_saved: DateTime<Utc>,
    expected_hash: &str,
) -> Result<String> {
    let stamp = format_timestamp(last_saved);
    let content = encode_body(&stamp)?;
    let message = format!(
        "{}: Updating manifest for {game}",
        format_timestamp(Utc::now())
    );
    store.put(&manifest_path(game), &content, Some(expected_hash), &message)
}

/// Provision an empty ("never synced") manifest. Create-only: an existing
/// manifest is never overwritten.
pub fn create<S: RemoteStore + ?Sized>(store: &S, game: &str) -> Result<String> {
    let content = encode_body("")?;
    let message = format!("Creating save storage for game {game}");
    store.put(&manifest_path(game), &content, None, &message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryStore;
    use chrono::TimeZone;

    #[test]
    fn read_missing_manifest() {
        let store = MemoryStore::new();
        let err = read(&store, "skyrim").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ManifestMissing);
    }

    #[test]
    fn read_corrupt_manifest() {
        let store = MemoryStore::new();
        store.seed("skyrim/manifest.json", b"not json");
        let err = read(&store, "skyrim").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ManifestMissing);
    }

    #[test]
    fn empty_last_saved_reads_as_never() {
        let store = MemoryStore::new();
        store.seed("skyrim/manifest.json", br#"{"lastSaved":""}"#);
        let manifest = read(&store, "skyrim").expect("read");
        assert_eq!(manifest.last_saved, LastSaved::Never);
    }

    #[test]
    fn unparseable_last_saved_reads_as_invalid() {
        let store = MemoryStore::new();
        store.seed("skyrim/manifest.json", br#"{"lastSaved":"yesterday"}"#);
        let manifest = read(&store, "skyrim").expect("read");
        assert_eq!(manifest.last_saved, LastSaved::Invalid("yesterday".into()));
    }

    #[test]
    fn write_round_trips_timestamp_exactly() {
        let store = MemoryStore::new();
        let hash = create(&store, "skyrim").expect("create");
        let stamp = Utc.timestamp_millis_opt(1_700_000_000_123).single().expect("ts");
        write(&store, "skyrim", stamp, &hash).expect("write");
        let manifest = read(&store, "skyrim").expect("read");
        assert_eq!(manifest.last_saved, LastSaved::At(stamp));
    }

    #[test]
    fn write_with_stale_hash_does_not_alter_manifest() {
        let store = MemoryStore::new();
        let hash = create(&store, "skyrim").expect("create");
        let t1 = Utc.timestamp_millis_opt(1_000).single().expect("ts");
        let t2 = Utc.timestamp_millis_opt(2_000).single().expect("ts");
        write(&store, "skyrim", t1, &hash).expect("first write");
        let err = write(&store, "skyrim", t2, &hash).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConcurrentModification);
        let manifest = read(&store, "skyrim").expect("read");
        assert_eq!(manifest.last_saved, LastSaved::At(t1));
    }

    #[test]
    fn create_refuses_to_overwrite() {
        let store = MemoryStore::new();
        create(&store, "skyrim").expect("create");
        let err = create(&store, "skyrim").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConcurrentModification);
    }
}
