//! Tracks the changelogs of a host's installed components against an
//! external registry catalog.
//!
//! The [`Tracker`] facade mirrors the host's installed list into a SQLite
//! store, links each component to a catalog entry, incrementally indexes the
//! registry, and flags components whose catalog version has moved on.

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod model;
pub mod registry;
pub mod store;
pub mod tracker;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

// Re-export common types for convenience
pub use config::{ConfigError, TrackerConfig};
pub use engine::{LinkReport, ReconcilePhase, ReconcileReport, UpdateReport};
pub use error::TrackerError;
pub use manifest::{derive_slug, JsonManifestSource, StaticManifestSource};
pub use model::*;
pub use registry::HttpRegistryClient;
pub use store::SqliteStore;
pub use tracker::Tracker;
pub use traits::*;
