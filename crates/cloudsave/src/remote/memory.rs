use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use sha2::{Digest, Sha256};

use crate::error::{Error, ErrorKind, Result};
use crate::remote::{RemoteEntry, RemoteFile, RemoteStore};

/// In-memory store with the same compare-and-swap semantics as the real
/// backend. Drives the test suites; hashes are sha256 of the content so
/// they are deterministic across runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

pub fn content_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

fn file_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A worker that panicked mid-call must not cascade into every later
    // caller; the map itself is always in a consistent state.
    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed an object directly, bypassing CAS. Returns its hash.
    pub fn seed(&self, path: &str, content: &[u8]) -> String {
        self.lock()
            .insert(path.trim_matches('/').to_string(), content.to_vec());
        content_hash(content)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.lock().contains_key(path.trim_matches('/'))
    }
}

impl RemoteStore for MemoryStore {
    fn get(&self, path: &str) -> Result<Option<RemoteFile>> {
        let objects = self.lock();
        Ok(objects.get(path.trim_matches('/')).map(|content| RemoteFile {
            name: file_name(path.trim_matches('/')),
            content: content.clone(),
            hash: content_hash(content),
        }))
    }

    fn put(
        &self,
        path: &str,
        content: &[u8],
        expected_hash: Option<&str>,
        _message: &str,
    ) -> Result<String> {
        let key = path.trim_matches('/').to_string();
        let mut objects = self.lock();
        let current = objects.get(&key).map(|c| content_hash(c));
        match (expected_hash, current) {
            (None, None) => {}
            (Some(expected), Some(current)) if expected == current => {}
            _ => {
                return Err(Error::new(
                    ErrorKind::ConcurrentModification,
                    format!("write to '{key}' rejected: content changed since it was last read"),
                ));
            }
        }
        objects.insert(key, content.to_vec());
        Ok(content_hash(content))
    }

    fn list(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let prefix = path.trim_matches('/');
        let objects = self.lock();
        let mut out = Vec::new();
        let mut dirs = Vec::new();
        for (key, content) in objects.iter() {
            let rest = if prefix.is_empty() {
                key.as_str()
            } else {
                match key.strip_prefix(prefix).and_then(|r| r.strip_prefix('/')) {
                    Some(r) => r,
                    None => continue,
                }
            };
            match rest.split_once('/') {
                // Direct child file.
                None => out.push(RemoteEntry {
                    name: rest.to_string(),
                    hash: content_hash(content),
                }),
                // Nested object: surface its first path segment as a
                // directory entry, the way a contents listing does.
                Some((dir, _)) => {
                    if !dirs.contains(&dir.to_string()) {
                        dirs.push(dir.to_string());
                        out.push(RemoteEntry {
                            name: dir.to_string(),
                            hash: String::new(),
                        });
                    }
                }
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_cas_update() {
        let store = MemoryStore::new();
        let h1 = store.put("game/slot.sav", b"v1", None, "create").expect("create");
        let h2 = store
            .put("game/slot.sav", b"v2", Some(&h1), "update")
            .expect("update");
        assert_ne!(h1, h2);
        let file = store.get("game/slot.sav").expect("get").expect("exists");
        assert_eq!(file.content, b"v2");
        assert_eq!(file.name, "slot.sav");
    }

    #[test]
    fn stale_hash_is_conflict_and_leaves_object_untouched() {
        let store = MemoryStore::new();
        let h1 = store.put("game/slot.sav", b"v1", None, "create").expect("create");
        store
            .put("game/slot.sav", b"v2", Some(&h1), "update")
            .expect("update");
        let err = store
            .put("game/slot.sav", b"v3", Some(&h1), "stale update")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConcurrentModification);
        let file = store.get("game/slot.sav").expect("get").expect("exists");
        assert_eq!(file.content, b"v2");
    }

    #[test]
    fn create_only_write_conflicts_with_existing_object() {
        let store = MemoryStore::new();
        store.put("game/manifest.json", b"{}", None, "create").expect("create");
        let err = store
            .put("game/manifest.json", b"{}", None, "create again")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConcurrentModification);
    }

    #[test]
    fn list_returns_direct_children_and_directories() {
        let store = MemoryStore::new();
        store.seed("game-a/manifest.json", b"{}");
        store.seed("game-a/slot.sav", b"bytes");
        store.seed("game-b/manifest.json", b"{}");
        let root = store.list("").expect("list root");
        let names: Vec<_> = root.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["game-a", "game-b"]);
        let children = store.list("game-a").expect("list game");
        let names: Vec<_> = children.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["manifest.json", "slot.sav"]);
    }

    #[test]
    fn missing_directory_lists_empty() {
        let store = MemoryStore::new();
        assert!(store.list("nowhere").expect("list").is_empty());
    }

    #[test]
    fn concurrent_create_only_writes_admit_exactly_one_winner() {
        let store = MemoryStore::new();
        let outcomes = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let store = &store;
                    scope.spawn(move || {
                        store.put(
                            "game/manifest.json",
                            format!("writer {i}").as_bytes(),
                            None,
                            "create",
                        )
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("worker"))
                .collect::<Vec<_>>()
        });
        let winners = outcomes.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        for result in outcomes.iter().filter(|r| r.is_err()) {
            assert_eq!(
                result.as_ref().unwrap_err().kind(),
                ErrorKind::ConcurrentModification
            );
        }
        assert!(store.contains("game/manifest.json"));
    }
}
