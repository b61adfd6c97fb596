pub mod github;
pub mod memory;

pub use github::GitHubStore;
pub use memory::MemoryStore;

use crate::error::Result;

/// A fetched remote object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub name: String,
    pub content: Vec<u8>,
    /// Content hash used as the compare-and-swap token on writes.
    pub hash: String,
}

/// A directory listing entry (no content).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub hash: String,
}

/// The content store the engine talks to. Paths are forward-slash relative
/// paths inside the store ("" is the root). Every write carries a commit
/// message; author identity is the store's concern.
pub trait RemoteStore {
    /// Fetch an object. `Ok(None)` means the object does not exist, which
    /// is distinct from a transport failure.
    fn get(&self, path: &str) -> Result<Option<RemoteFile>>;

    /// Compare-and-swap write. With `Some(hash)` the write is accepted only
    /// if the object's current hash still matches; with `None` the write is
    /// create-only and an existing object is a conflict. Returns the new
    /// content hash. Stale or colliding writes fail with
    /// `ErrorKind::ConcurrentModification` and leave the object untouched.
    fn put(
        &self,
        path: &str,
        content: &[u8],
        expected_hash: Option<&str>,
        message: &str,
    ) -> Result<String>;

    /// List the direct children of a directory. A directory that does not
    /// exist lists as empty.
    fn list(&self, path: &str) -> Result<Vec<RemoteEntry>>;
}
