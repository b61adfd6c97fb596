pub mod backup;
pub mod config;
pub mod error;
pub mod local;
pub mod manifest;
pub mod prompt;
pub mod reconcile;
pub mod remote;
pub mod sync;

pub use error::{Error, ErrorKind, Result};
