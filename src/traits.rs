//! Ports between the reconciliation engine and its collaborators.
//!
//! The engine only ever talks to the registry, the store and the host through
//! these traits, so each can be swapped for a test double or another backend.

use crate::model::{
    CatalogItem, ChangelogEntry, ComponentFilter, ComponentObservation, EntryRecord, EntrySource,
    HostManifest, LinkedComponent, Lookup, MonitoredComponent, TrackerStats, UpdateNotice, Upsert,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Recoverable registry failure. Callers treat every variant the same way:
/// skip the item and let the next tick retry.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Registry request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Registry returned HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("Malformed registry payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum StoreError {
    /// No connection could be obtained; the store is unavailable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Query failed: {0}")]
    Query(#[from] diesel::result::Error),
    #[error("Migration failed: {0}")]
    Migration(String),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
    /// The blocking task running the query panicked or was cancelled.
    #[error("Store task failed: {0}")]
    Task(String),
}

impl StoreError {
    /// Whether the whole store is gone, as opposed to a single statement failing.
    ///
    /// Per-item loops skip items on row-level errors but abort on these.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Task(_))
    }
}

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read manifest list: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse manifest list: {0}")]
    Parse(#[from] serde_json::Error),
}

// ============================================================================
// Registry
// ============================================================================

/// Read-only client for the external catalog.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Fetches one page of the catalog, in registry order.
    async fn list_page(&self, page: u32, page_size: u32)
        -> Result<Vec<CatalogItem>, RegistryError>;

    /// Looks up a single catalog item by key.
    ///
    /// `Ok(Lookup::NotFound)` means the registry answered and has no such key;
    /// `Err` means the question could not be answered this time.
    async fn lookup_by_key(&self, key: &str) -> Result<Lookup, RegistryError>;
}

// ============================================================================
// Store
// ============================================================================

/// Persistence for catalog entries, monitored components and tracker state.
///
/// Every write is either an atomic upsert keyed on the unique key/slug or a
/// single-row update, so concurrent callers never need external locking.
#[async_trait]
pub trait TrackerStore: Send + Sync {
    // --- catalog entries ----------------------------------------------------

    async fn find_entry(&self, key: &str) -> Result<Option<ChangelogEntry>, StoreError>;

    /// First entry (by key) whose display name contains `fragment`, case-sensitively.
    async fn find_entry_by_name_containing(
        &self,
        fragment: &str,
    ) -> Result<Option<ChangelogEntry>, StoreError>;

    async fn list_entries(
        &self,
        source: Option<EntrySource>,
    ) -> Result<Vec<ChangelogEntry>, StoreError>;

    /// Inserts the entry, or refreshes name, version and check time of an existing one.
    async fn upsert_entry(&self, record: &EntryRecord) -> Result<Upsert, StoreError>;

    /// Inserts the entry unless the key exists. Returns `true` if a row was created.
    async fn insert_entry_if_absent(&self, record: &EntryRecord) -> Result<bool, StoreError>;

    async fn count_entries(&self) -> Result<u64, StoreError>;

    /// Case-insensitive substring search over entry name and key, ordered by name.
    async fn search_entries(
        &self,
        term: &str,
        source: Option<EntrySource>,
        limit: u32,
    ) -> Result<Vec<ChangelogEntry>, StoreError>;

    /// Entries with a recorded catalog update, newest first.
    async fn recent_updates(&self, limit: u32) -> Result<Vec<ChangelogEntry>, StoreError>;

    // --- monitored components ----------------------------------------------

    async fn find_component(&self, slug: &str) -> Result<Option<MonitoredComponent>, StoreError>;

    async fn list_components(
        &self,
        filter: ComponentFilter,
    ) -> Result<Vec<MonitoredComponent>, StoreError>;

    async fn list_unlinked_components(&self) -> Result<Vec<MonitoredComponent>, StoreError>;

    /// Inserts a new `monitoring` row, or refreshes name, version, active flag
    /// and check time of an existing one. Link and update state are never touched.
    async fn upsert_component(&self, observation: &ComponentObservation)
        -> Result<Upsert, StoreError>;

    async fn set_component_link(&self, slug: &str, entry_key: &str) -> Result<(), StoreError>;

    /// Records a catalog version newer than the installed one, in one transaction:
    /// the entry takes `version` as `last_version` (with `last_updated_at` and
    /// `last_checked_at` set to `at`) and the component is flagged with
    /// `has_update` and `available_version`. Either both rows change or neither does.
    async fn record_drift(
        &self,
        entry_key: &str,
        slug: &str,
        version: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Components whose link resolves to an existing entry, optionally
    /// restricted to entries of one source.
    async fn list_linked(
        &self,
        source: Option<EntrySource>,
    ) -> Result<Vec<LinkedComponent>, StoreError>;

    async fn update_notices(&self, active_only: bool) -> Result<Vec<UpdateNotice>, StoreError>;

    async fn stats(&self) -> Result<TrackerStats, StoreError>;

    // --- process-wide state -------------------------------------------------

    async fn get_state(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_state(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

// ============================================================================
// Host
// ============================================================================

/// Host introspection: what is installed right now.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn list_installed(&self) -> Result<Vec<HostManifest>, ManifestError>;
}
