use std::fmt;

/// Failure classes surfaced to the caller. Every engine operation maps its
/// failures onto one of these so the CLI can report them without string
/// matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Save directory does not exist or cannot be listed/read.
    DirectoryUnreadable,
    /// Save directory exists but contains no files.
    NoSaveFiles,
    /// The remote manifest object does not exist or is unusable.
    ManifestMissing,
    /// Network failure, timeout, or an auth rejection from the remote store.
    RemoteUnavailable,
    /// A compare-and-swap write observed a stale content hash.
    ConcurrentModification,
    /// The remote game directory holds no save object to download.
    RemoteSaveNotFound,
    /// The backup destination could not be created.
    BackupDirectoryUnwritable,
    /// Copying the save tree into the backup folder failed.
    CopyFailed,
    /// Writing a downloaded save to the local directory failed.
    LocalWriteFailed,
    /// Settings file problems (missing fields, bad JSON, unwritable path).
    Config,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    msg: String,
}

impl Error {
    pub fn new<M: Into<String>>(kind: ErrorKind, msg: M) -> Self {
        Self {
            kind,
            msg: msg.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Prepend context to the message, keeping the kind.
    pub fn context<M: Into<String>>(self, msg: M) -> Self {
        Self {
            kind: self.kind,
            msg: format!("{}: {}", msg.into(), self.msg),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
