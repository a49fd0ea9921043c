use thiserror::Error;

use crate::config::ConfigError;
use crate::traits::{ManifestError, RegistryError, StoreError};

/// Errors surfaced by [`Tracker`](crate::Tracker) operations.
///
/// Registry and manifest failures inside a run are absorbed and counted;
/// they only reach callers when a client or source cannot be built at all.
/// A store error aborts the current operation.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
